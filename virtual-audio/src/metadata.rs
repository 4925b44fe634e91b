//! Speaker metadata attached to audio frames.
//!
//! ```xml
//! <VirtualSpeakers>
//!   <Speaker x="-1" y="0" z="1" gain="1"/>
//!   <Speaker x="1" y="0" z="1" gain="0.5" objectbased="true"/>
//! </VirtualSpeakers>
//! ```

use crate::error::{Result, VirtualAudioError};
use crate::math::Vec3;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::reader::Reader;

const ROOT: &str = "VirtualSpeakers";
const SPEAKER: &str = "Speaker";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeakerHint {
    pub position: Vec3,
    pub gain: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeakerMetadata {
    pub speakers: Vec<SpeakerHint>,
    /// Set when any speaker carries the `objectbased` attribute
    pub object_based: bool,
}

impl SpeakerMetadata {
    pub fn positions(&self) -> Vec<Vec3> {
        self.speakers.iter().map(|s| s.position).collect()
    }

    pub fn gains(&self) -> Vec<f32> {
        self.speakers.iter().map(|s| s.gain).collect()
    }
}

fn metadata_error(context: &str, e: impl std::fmt::Display) -> VirtualAudioError {
    VirtualAudioError::Metadata(format!("{}: {}", context, e))
}

fn parse_speaker(element: &BytesStart<'_>, index: usize) -> Result<(SpeakerHint, bool)> {
    let mut x = None;
    let mut y = None;
    let mut z = None;
    let mut gain = 1.0;
    let mut object_based = false;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| metadata_error("Invalid speaker attribute", e))?;
        let value = attr
            .unescape_value()
            .map_err(|e| metadata_error("Invalid attribute value", e))?;
        let parse = |name: &str| {
            value.trim().parse::<f32>().map_err(|e| {
                VirtualAudioError::Metadata(format!(
                    "Speaker {} has invalid {} value '{}': {}",
                    index, name, value, e
                ))
            })
        };

        match attr.key.as_ref() {
            b"x" => x = Some(parse("x")?),
            b"y" => y = Some(parse("y")?),
            b"z" => z = Some(parse("z")?),
            b"gain" => gain = parse("gain")?,
            b"objectbased" => object_based = true,
            _ => {}
        }
    }

    match (x, y, z) {
        (Some(x), Some(y), Some(z)) => Ok((
            SpeakerHint {
                position: Vec3::new(x, y, z),
                gain,
            },
            object_based,
        )),
        _ => Err(VirtualAudioError::Metadata(format!(
            "Speaker {} is missing a coordinate",
            index
        ))),
    }
}

/// Reads every `<Speaker>` element, in document order.
pub fn parse_speaker_metadata(xml: &str) -> Result<SpeakerMetadata> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut metadata = SpeakerMetadata::default();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == SPEAKER.as_bytes() => {
                let (speaker, object_based) = parse_speaker(&e, metadata.speakers.len())?;
                metadata.object_based |= object_based;
                metadata.speakers.push(speaker);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(VirtualAudioError::Metadata(format!(
                    "Malformed metadata at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        }
    }

    log::debug!(
        "Parsed {} speakers from metadata (object-based: {})",
        metadata.speakers.len(),
        metadata.object_based
    );
    Ok(metadata)
}

fn write_speakers(positions: &[Vec3], gains: &[f32], object_based: bool) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Start(BytesStart::new(ROOT)))
        .map_err(|e| metadata_error("Failed to write metadata", e))?;

    for (i, position) in positions.iter().enumerate() {
        let x = position.x.to_string();
        let y = position.y.to_string();
        let z = position.z.to_string();
        let gain = gains.get(i).copied().unwrap_or(1.0).to_string();

        let mut speaker = BytesStart::new(SPEAKER);
        if object_based {
            speaker.push_attribute(("objectbased", "true"));
        }
        speaker.push_attribute(("x", x.as_str()));
        speaker.push_attribute(("y", y.as_str()));
        speaker.push_attribute(("z", z.as_str()));
        speaker.push_attribute(("gain", gain.as_str()));

        writer
            .write_event(Event::Empty(speaker))
            .map_err(|e| metadata_error("Failed to write metadata", e))?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(ROOT)))
        .map_err(|e| metadata_error("Failed to write metadata", e))?;

    String::from_utf8(writer.into_inner()).map_err(|e| metadata_error("Metadata is not UTF-8", e))
}

/// Metadata describing listener positions of a spatial mix.
pub fn speaker_metadata_xml(positions: &[Vec3], gains: &[f32]) -> Result<String> {
    write_speakers(positions, gains, false)
}

/// Metadata describing object positions and gains, one speaker per channel.
pub fn object_metadata_xml(positions: &[Vec3], gains: &[f32]) -> Result<String> {
    write_speakers(positions, gains, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_defaults() {
        let xml = r#"<VirtualSpeakers>
            <Speaker x="-1.5" y="0" z="2"/>
            <Speaker x="1" y="0.25" z="-2" gain="0.5"></Speaker>
        </VirtualSpeakers>"#;
        let metadata = parse_speaker_metadata(xml).unwrap();
        assert!(!metadata.object_based);
        assert_eq!(metadata.speakers.len(), 2);
        assert_eq!(metadata.speakers[0].position, Vec3::new(-1.5, 0.0, 2.0));
        assert_eq!(metadata.speakers[0].gain, 1.0);
        assert_eq!(metadata.speakers[1].gain, 0.5);
    }

    #[test]
    fn test_object_based_flag() {
        let xml = r#"<VirtualSpeakers><Speaker x="0" y="0" z="0"/><Speaker objectbased="true" x="1" y="1" z="1"/></VirtualSpeakers>"#;
        assert!(parse_speaker_metadata(xml).unwrap().object_based);
    }

    #[test]
    fn test_speaker_metadata_survives_a_round_trip() {
        let positions = [Vec3::new(-1.0, 0.0, 1.0), Vec3::new(0.125, 2.5, -3.0)];
        let gains = [1.0, 0.75];
        let xml = speaker_metadata_xml(&positions, &gains).unwrap();
        let parsed = parse_speaker_metadata(&xml).unwrap();
        assert_eq!(parsed.positions(), positions);
        assert_eq!(parsed.gains(), gains);
        assert!(!parsed.object_based);

        let xml = object_metadata_xml(&positions, &gains).unwrap();
        assert!(xml.contains("objectbased=\"true\""));
        assert!(parse_speaker_metadata(&xml).unwrap().object_based);
    }

    #[test]
    fn test_numbers_use_dot_separator() {
        let xml = speaker_metadata_xml(&[Vec3::new(0.5, -1.25, 3.0)], &[]).unwrap();
        assert!(xml.contains("x=\"0.5\""));
        assert!(xml.contains("y=\"-1.25\""));
    }

    #[test]
    fn test_malformed_metadata_is_an_error() {
        assert!(parse_speaker_metadata("<VirtualSpeakers><Speaker x=\"1\" y=\"0\"/></VirtualSpeakers>").is_err());
        assert!(parse_speaker_metadata("<VirtualSpeakers><Speaker x=\"one\" y=\"0\" z=\"0\"/></VirtualSpeakers>").is_err());
        assert!(parse_speaker_metadata("<VirtualSpeakers></Other>").is_err());
    }

    #[test]
    fn test_empty_document() {
        let metadata = parse_speaker_metadata("<VirtualSpeakers/>").unwrap();
        assert!(metadata.speakers.is_empty());
    }
}
