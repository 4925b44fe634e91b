//! ADM-OSC object positions for external renderers.

use crate::config::{OscSetting, VirtualAudioSetupConfig};
use crate::error::{Result, VirtualAudioError};
use crate::math::{Vec3, inverse_lerp};
use rosc::{OscMessage, OscPacket, OscType};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

/// Position message for object `index` (zero-based; ADM ids start at 1).
///
/// The direction is kept and the distance is mapped to `[0.001, 1]` between
/// `near` and `far`. Arguments are sent as `x, z, y`.
pub fn object_position_message(index: usize, position: Vec3, near: f32, far: f32) -> OscMessage {
    let scale = inverse_lerp(near, far, position.length()).max(0.001);
    let p = position.normalize_or_zero() * scale;
    OscMessage {
        addr: format!("/adm/obj/{}/xyz", index + 1),
        args: vec![OscType::Float(p.x), OscType::Float(p.z), OscType::Float(p.y)],
    }
}

pub struct AdmOscSender {
    socket: UdpSocket,
    target: SocketAddr,
    near_distance: f32,
    far_distance: f32,
}

impl AdmOscSender {
    pub fn new(setting: &OscSetting) -> Result<Self> {
        let target = (setting.host.as_str(), setting.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                VirtualAudioError::Osc(format!("Cannot resolve {}:{}", setting.host, setting.port))
            })?;
        let bind: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind)?;
        log::info!("Sending ADM-OSC to {}", target);

        Ok(Self {
            socket,
            target,
            near_distance: setting.near_distance,
            far_distance: setting.far_distance,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn set_distances(&mut self, near: f32, far: f32) {
        self.near_distance = near;
        self.far_distance = far;
    }

    fn send(&self, message: OscMessage) -> Result<()> {
        let packet = OscPacket::Message(message);
        let bytes = rosc::encoder::encode(&packet)
            .map_err(|e| VirtualAudioError::Osc(format!("Failed to encode message: {}", e)))?;
        self.socket.send_to(&bytes, self.target)?;
        Ok(())
    }

    /// Sends one position message per object, ids in channel order.
    pub fn send_positions(&self, positions: &[Vec3]) -> Result<()> {
        for (index, position) in positions.iter().enumerate() {
            self.send(object_position_message(
                index,
                *position,
                self.near_distance,
                self.far_distance,
            ))?;
        }
        Ok(())
    }

    /// Sends the configured init commands: float, then int, then plain.
    pub fn send_init_commands(&self, config: &VirtualAudioSetupConfig) -> Result<()> {
        for cmd in &config.osc_init_commands_floats {
            self.send(OscMessage {
                addr: cmd.command.clone(),
                args: cmd.parameters.iter().map(|p| OscType::Float(*p)).collect(),
            })?;
        }
        for cmd in &config.osc_init_commands_ints {
            self.send(OscMessage {
                addr: cmd.command.clone(),
                args: cmd.parameters.iter().map(|p| OscType::Int(*p)).collect(),
            })?;
        }
        for cmd in &config.osc_init_commands {
            self.send(OscMessage {
                addr: cmd.command.clone(),
                args: Vec::new(),
            })?;
        }
        log::debug!(
            "Sent {} OSC init commands",
            config.osc_init_commands_floats.len()
                + config.osc_init_commands_ints.len()
                + config.osc_init_commands.len()
        );
        Ok(())
    }
}
