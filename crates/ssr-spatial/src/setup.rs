//! Loudspeaker reproduction setup, loaded from the `reproduction_setup`
//! XML format: a flat list of `<loudspeaker>` elements plus two
//! generator shorthands, `<linear_array>` and `<circular_array>`, and a
//! `<skip>` that reserves output channels without emitting loudspeakers.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use ssr_core::{rotation_from_2d_azimuth, Error, Position, Result, Rotation};

use crate::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoudspeakerModel {
    Normal,
    Subwoofer,
}

#[derive(Debug, Clone, Copy)]
pub struct Loudspeaker {
    pub position: Position,
    pub orientation: Rotation,
    pub model: LoudspeakerModel,
    pub delay: Sample,
    pub weight: Sample,
    /// Output channel this loudspeaker is wired to: its ordinal in the
    /// emitted sequence, counting skipped channels, starting at 1.
    pub channel: usize,
}

/// Parses a `reproduction_setup` document into its ordered loudspeaker
/// list. Channel numbers follow emission order, including gaps left by
/// `<skip>`.
pub fn parse_setup(xml: &str) -> Result<Vec<Loudspeaker>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut loudspeakers = Vec::new();
    let mut channel_cursor = 0usize;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Eof => break,
            Event::Start(tag) => match tag.name().as_ref() {
                b"loudspeaker" => {
                    let attrs = read_attrs(&tag)?;
                    let model = match attrs.get("model").map(String::as_str) {
                        Some("subwoofer") => LoudspeakerModel::Subwoofer,
                        _ => LoudspeakerModel::Normal,
                    };
                    let delay = parse_attr(&attrs, "delay")?.unwrap_or(0.0);
                    let weight = parse_attr(&attrs, "weight")?.unwrap_or(1.0);
                    let anchor = read_anchor(&mut reader, &mut buf, b"loudspeaker")?;
                    channel_cursor += 1;
                    loudspeakers.push(Loudspeaker {
                        position: Position::new(anchor.x, anchor.y, 0.0),
                        orientation: rotation_from_2d_azimuth(anchor.azimuth.unwrap_or(0.0)),
                        model,
                        delay,
                        weight,
                        channel: channel_cursor,
                    });
                }
                b"linear_array" => {
                    let attrs = read_attrs(&tag)?;
                    let n = parse_attr(&attrs, "number")?
                        .ok_or_else(|| Error::Configuration("linear_array missing number".into()))?;
                    let frame = read_array_frame(&mut reader, &mut buf, b"linear_array")?;
                    for (position, orientation) in linear_array(n, &frame)? {
                        channel_cursor += 1;
                        loudspeakers.push(Loudspeaker {
                            position,
                            orientation,
                            model: LoudspeakerModel::Normal,
                            delay: 0.0,
                            weight: 1.0,
                            channel: channel_cursor,
                        });
                    }
                }
                b"circular_array" => {
                    let attrs = read_attrs(&tag)?;
                    let n = parse_attr(&attrs, "number")?
                        .ok_or_else(|| Error::Configuration("circular_array missing number".into()))?;
                    let frame = read_array_frame(&mut reader, &mut buf, b"circular_array")?;
                    for (position, orientation) in circular_array(n, &frame)? {
                        channel_cursor += 1;
                        loudspeakers.push(Loudspeaker {
                            position,
                            orientation,
                            model: LoudspeakerModel::Normal,
                            delay: 0.0,
                            weight: 1.0,
                            channel: channel_cursor,
                        });
                    }
                }
                b"skip" => {
                    let attrs = read_attrs(&tag)?;
                    let n: usize = parse_attr(&attrs, "number")?.unwrap_or(1);
                    channel_cursor += n;
                }
                _ => {}
            },
            Event::Empty(tag) if tag.name().as_ref() == b"skip" => {
                let attrs = read_attrs(&tag)?;
                let n: usize = parse_attr(&attrs, "number")?.unwrap_or(1);
                channel_cursor += n;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(loudspeakers)
}

#[derive(Default, Clone, Copy)]
struct Anchor {
    x: Sample,
    y: Sample,
    azimuth: Option<Sample>,
}

#[derive(Default)]
struct ArrayFrame {
    center: Option<Anchor>,
    first: Option<Anchor>,
    second: Option<Anchor>,
    last: Option<Anchor>,
}

fn read_anchor(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>, end_name: &[u8]) -> Result<Anchor> {
    let mut anchor = Anchor::default();
    loop {
        match reader.read_event_into(buf).map_err(xml_err)? {
            Event::Empty(tag) | Event::Start(tag) => {
                let attrs = read_attrs(&tag)?;
                match tag.name().as_ref() {
                    b"position" => {
                        anchor.x = parse_attr(&attrs, "x")?.unwrap_or(0.0);
                        anchor.y = parse_attr(&attrs, "y")?.unwrap_or(0.0);
                    }
                    b"orientation" | b"angle" => {
                        anchor.azimuth = parse_attr(&attrs, "azimuth")?;
                    }
                    _ => {}
                }
            }
            Event::End(tag) if tag.name().as_ref() == end_name => break,
            Event::Eof => {
                return Err(Error::Configuration(
                    "unexpected end of file in loudspeaker setup".into(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(anchor)
}

fn read_array_frame(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>, end_name: &[u8]) -> Result<ArrayFrame> {
    let mut frame = ArrayFrame::default();
    loop {
        match reader.read_event_into(buf).map_err(xml_err)? {
            Event::Start(tag) => {
                let name = tag.name().as_ref().to_vec();
                let anchor = read_anchor(reader, buf, &name)?;
                match name.as_slice() {
                    b"center" => frame.center = Some(anchor),
                    b"first" => frame.first = Some(anchor),
                    b"second" => frame.second = Some(anchor),
                    b"last" => frame.last = Some(anchor),
                    _ => {}
                }
            }
            Event::End(tag) if tag.name().as_ref() == end_name => break,
            Event::Eof => {
                return Err(Error::Configuration(
                    "unexpected end of file in loudspeaker setup".into(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(frame)
}

fn linear_array(n: usize, frame: &ArrayFrame) -> Result<Vec<(Position, Rotation)>> {
    let first = frame
        .first
        .ok_or_else(|| Error::Configuration("linear_array missing <first>".into()))?;
    let az0 = first.azimuth.unwrap_or(0.0);

    let (dx, dy, daz) = if let Some(second) = frame.second {
        (
            second.x - first.x,
            second.y - first.y,
            second.azimuth.unwrap_or(az0) - az0,
        )
    } else if let Some(last) = frame.last {
        let steps = (n.max(2) - 1) as Sample;
        (
            (last.x - first.x) / steps,
            (last.y - first.y) / steps,
            (last.azimuth.unwrap_or(az0) - az0) / steps,
        )
    } else {
        return Err(Error::Configuration(
            "linear_array requires <second> or <last>".into(),
        ));
    };

    Ok((0..n)
        .map(|i| {
            let t = i as Sample;
            let position = Position::new(first.x + t * dx, first.y + t * dy, 0.0);
            (position, rotation_from_2d_azimuth(az0 + t * daz))
        })
        .collect())
}

fn circular_array(n: usize, frame: &ArrayFrame) -> Result<Vec<(Position, Rotation)>> {
    let center = frame
        .center
        .ok_or_else(|| Error::Configuration("circular_array missing <center>".into()))?;
    let first = frame
        .first
        .ok_or_else(|| Error::Configuration("circular_array missing <first>".into()))?;

    let dx = first.x - center.x;
    let dy = first.y - center.y;
    let radius = (dx * dx + dy * dy).sqrt();
    let angle0 = dy.atan2(dx);
    let az0 = first.azimuth.unwrap_or(0.0);

    let step_deg = if let Some(second) = frame.second {
        second.azimuth.unwrap_or(0.0)
    } else if let Some(last) = frame.last {
        last.azimuth.unwrap_or(0.0) / (n.max(2) - 1) as Sample
    } else {
        return Err(Error::Configuration(
            "circular_array requires <second> or <last>".into(),
        ));
    };
    let step_rad = step_deg.to_radians();

    Ok((0..n)
        .map(|i| {
            let t = i as Sample;
            let angle = angle0 + t * step_rad;
            let position = Position::new(
                center.x + radius * angle.cos(),
                center.y + radius * angle.sin(),
                0.0,
            );
            (position, rotation_from_2d_azimuth(az0 + t * step_deg))
        })
        .collect())
}

fn xml_err(e: quick_xml::Error) -> Error {
    Error::Configuration(format!("loudspeaker setup xml: {e}"))
}

fn read_attrs(tag: &BytesStart) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for attr in tag.attributes() {
        let attr = attr.map_err(|e| Error::Configuration(format!("xml attribute: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::Configuration(format!("xml attribute value: {e}")))?
            .into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

fn parse_attr<T: std::str::FromStr>(attrs: &HashMap<String, String>, key: &str) -> Result<Option<T>> {
    attrs
        .get(key)
        .map(|v| v.parse::<T>())
        .transpose()
        .map_err(|_| Error::Configuration(format!("invalid value for attribute {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_loudspeaker() {
        let xml = r#"<reproduction_setup>
            <loudspeaker model="subwoofer" delay="0.001" weight="1.5">
                <position x="1.0" y="2.0"/>
                <orientation azimuth="90"/>
            </loudspeaker>
        </reproduction_setup>"#;
        let speakers = parse_setup(xml).unwrap();
        assert_eq!(speakers.len(), 1);
        assert_eq!(speakers[0].model, LoudspeakerModel::Subwoofer);
        assert_eq!(speakers[0].channel, 1);
        assert!((speakers[0].delay - 0.001).abs() < 1e-6);
    }

    #[test]
    fn skip_reserves_channel_numbers() {
        let xml = r#"<reproduction_setup>
            <loudspeaker><position x="0" y="0"/><orientation azimuth="0"/></loudspeaker>
            <skip number="2"/>
            <loudspeaker><position x="1" y="0"/><orientation azimuth="0"/></loudspeaker>
        </reproduction_setup>"#;
        let speakers = parse_setup(xml).unwrap();
        assert_eq!(speakers.len(), 2);
        assert_eq!(speakers[0].channel, 1);
        assert_eq!(speakers[1].channel, 4);
    }

    #[test]
    fn linear_array_interpolates_between_first_and_last() {
        let xml = r#"<reproduction_setup>
            <linear_array number="3">
                <first><position x="0" y="0"/><orientation azimuth="0"/></first>
                <last><position x="4" y="0"/><orientation azimuth="0"/></last>
            </linear_array>
        </reproduction_setup>"#;
        let speakers = parse_setup(xml).unwrap();
        assert_eq!(speakers.len(), 3);
        assert_eq!(speakers[1].position.x, 2.0);
        assert_eq!(speakers[2].position.x, 4.0);
    }

    #[test]
    fn circular_array_spaces_equally_around_center() {
        let xml = r#"<reproduction_setup>
            <circular_array number="4">
                <center><position x="0" y="0"/></center>
                <first><position x="1" y="0"/><orientation azimuth="0"/></first>
                <second><angle azimuth="90"/></second>
            </circular_array>
        </reproduction_setup>"#;
        let speakers = parse_setup(xml).unwrap();
        assert_eq!(speakers.len(), 4);
        assert!((speakers[1].position.y - 1.0).abs() < 1e-5);
    }
}
