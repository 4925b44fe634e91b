//! Receive side: turning network frames into device audio.

pub mod converter;
pub mod frame;
pub mod receiver;
pub mod ring_buffer;
pub mod speakers;

pub use converter::{ResamplerConverter, convert_frame};
pub use frame::{AudioFrame, CapturedFrame, ChannelFrameSource, FrameSource};
pub use receiver::{
    AudioReceiver, CancellationToken, OutputFormat, ReceiveHandle, ReceiverPlayback,
    ReceiverSettings, ReceiverShared, spawn_receive_thread,
};
pub use ring_buffer::{BufferSnapshot, BufferState, FrameIngestRingBuffer, PullResult};
pub use speakers::{VirtualSpeakerRenderer, layout_for_channels};
