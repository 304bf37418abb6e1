use crate::error::{Error, Result};
use crate::prelude::{NodeId, Real};
use crate::traits::{Trait, TraitData};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::io::{Read, Write};

/// One contact edge. Edges are owned by the partition that owns the target
/// node and sorted lexicographically by (target, source).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    pub target: NodeId,
    pub target_activity: TraitData,
    pub source: NodeId,
    pub source_activity: TraitData,
    pub duration: Real,
    pub location_id: Option<u64>,
    pub edge_trait: TraitData,
    pub active: bool,
    pub weight: Real,
}

impl EdgeData {
    pub fn new(target: NodeId, source: NodeId) -> Self {
        EdgeData {
            target,
            target_activity: 0,
            source,
            source_activity: 0,
            duration: 0.0,
            location_id: None,
            edge_trait: 0,
            active: true,
            weight: 1.0,
        }
    }

    pub fn key(&self) -> (NodeId, NodeId) {
        (self.target, self.source)
    }

    pub fn compare(&self, other: &EdgeData) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Which optional fields a network file carries; declared by the preamble.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeFields {
    pub location_id: bool,
    pub edge_trait: bool,
    pub active: bool,
    pub weight: bool,
}

fn parse_activity(text: &str, activity: &Trait) -> Result<TraitData> {
    // The canonical encoding is `feature:enum`; plain integers are accepted
    // as an already packed word.
    if let Ok(raw) = text.parse::<u32>() {
        return Ok(raw);
    }
    activity.data_from_text(text)
}

fn parse_bool(text: &str) -> Result<bool> {
    match text {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(Error::configuration(format!("invalid active flag '{}'", text))),
    }
}

impl EdgeData {
    /// Parse one CSV record of the text body, in declared field order:
    /// `targetPID,targetActivity,sourcePID,sourceActivity,duration[,LID][,edgeTrait][,active][,weight]`.
    pub fn from_record(
        record: &csv::StringRecord,
        fields: &EdgeFields,
        activity: &Trait,
        edge_trait: Option<&Trait>,
    ) -> Result<EdgeData> {
        let mut it = record.iter();
        let mut next = |what: &str| {
            it.next()
                .ok_or_else(|| Error::configuration(format!("edge record: missing {}", what)))
        };

        let target: NodeId = next("targetPID")?
            .parse()
            .map_err(|_| Error::configuration("edge record: bad targetPID"))?;
        let target_activity = parse_activity(next("targetActivity")?, activity)?;
        let source: NodeId = next("sourcePID")?
            .parse()
            .map_err(|_| Error::configuration("edge record: bad sourcePID"))?;
        let source_activity = parse_activity(next("sourceActivity")?, activity)?;
        let duration: Real = next("duration")?
            .parse()
            .map_err(|_| Error::configuration("edge record: bad duration"))?;

        let mut edge = EdgeData::new(target, source);
        edge.target_activity = target_activity;
        edge.source_activity = source_activity;
        edge.duration = duration;

        if fields.location_id {
            edge.location_id = Some(
                next("LID")?
                    .parse()
                    .map_err(|_| Error::configuration("edge record: bad LID"))?,
            );
        }
        if fields.edge_trait {
            let text = next("edgeTrait")?;
            edge.edge_trait = match edge_trait {
                Some(t) => {
                    if let Ok(raw) = text.parse::<u32>() {
                        raw
                    } else {
                        t.data_from_text(text)?
                    }
                }
                None => text.parse::<u32>().unwrap_or(0),
            };
        }
        if fields.active {
            edge.active = parse_bool(next("active")?)?;
        }
        if fields.weight {
            edge.weight = next("weight")?
                .parse()
                .map_err(|_| Error::configuration("edge record: bad weight"))?;
        }

        Ok(edge)
    }

    /// Render the text body record in declared field order.
    pub fn to_record(&self, fields: &EdgeFields) -> Vec<String> {
        let mut out = vec![
            self.target.to_string(),
            self.target_activity.to_string(),
            self.source.to_string(),
            self.source_activity.to_string(),
            self.duration.to_string(),
        ];
        if fields.location_id {
            out.push(self.location_id.unwrap_or(0).to_string());
        }
        if fields.edge_trait {
            out.push(self.edge_trait.to_string());
        }
        if fields.active {
            out.push(if self.active { "1" } else { "0" }.to_string());
        }
        if fields.weight {
            out.push(self.weight.to_string());
        }
        out
    }

    /// Read one fixed binary record. Field order matches the text body; pids
    /// are little-endian `sizeof_pid`-byte integers, activities and the edge
    /// trait are 4-byte words, reals are 8-byte doubles, active is one byte.
    pub fn read_binary<R: Read>(
        reader: &mut R,
        fields: &EdgeFields,
        sizeof_pid: usize,
    ) -> Result<EdgeData> {
        let target = read_pid(reader, sizeof_pid)?;
        let target_activity = read_u32(reader)?;
        let source = read_pid(reader, sizeof_pid)?;
        let source_activity = read_u32(reader)?;
        let duration = read_f64(reader)?;

        let mut edge = EdgeData::new(target, source);
        edge.target_activity = target_activity;
        edge.source_activity = source_activity;
        edge.duration = duration;

        if fields.location_id {
            edge.location_id = Some(read_pid(reader, 8)?);
        }
        if fields.edge_trait {
            edge.edge_trait = read_u32(reader)?;
        }
        if fields.active {
            let mut buf = [0u8; 1];
            reader.read_exact(&mut buf)?;
            edge.active = buf[0] != 0;
        }
        if fields.weight {
            edge.weight = read_f64(reader)?;
        }

        Ok(edge)
    }

    pub fn write_binary<W: Write>(
        &self,
        writer: &mut W,
        fields: &EdgeFields,
        sizeof_pid: usize,
    ) -> Result<()> {
        write_pid(writer, self.target, sizeof_pid)?;
        writer.write_all(&self.target_activity.to_le_bytes())?;
        write_pid(writer, self.source, sizeof_pid)?;
        writer.write_all(&self.source_activity.to_le_bytes())?;
        writer.write_all(&self.duration.to_le_bytes())?;
        if fields.location_id {
            writer.write_all(&self.location_id.unwrap_or(0).to_le_bytes())?;
        }
        if fields.edge_trait {
            writer.write_all(&self.edge_trait.to_le_bytes())?;
        }
        if fields.active {
            writer.write_all(&[self.active as u8])?;
        }
        if fields.weight {
            writer.write_all(&self.weight.to_le_bytes())?;
        }
        Ok(())
    }
}

fn read_pid<R: Read>(reader: &mut R, sizeof_pid: usize) -> Result<u64> {
    match sizeof_pid {
        4 => {
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf)?;
            Ok(u32::from_le_bytes(buf) as u64)
        }
        8 => {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf)?;
            Ok(u64::from_le_bytes(buf))
        }
        other => Err(Error::configuration(format!("unsupported sizeofPID {}", other))),
    }
}

fn write_pid<W: Write>(writer: &mut W, pid: u64, sizeof_pid: usize) -> Result<()> {
    match sizeof_pid {
        4 => writer.write_all(&(pid as u32).to_le_bytes())?,
        8 => writer.write_all(&pid.to_le_bytes())?,
        other => return Err(Error::configuration(format!("unsupported sizeofPID {}", other))),
    }
    Ok(())
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f64<R: Read>(reader: &mut R) -> Result<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_roundtrip() {
        let fields = EdgeFields {
            location_id: true,
            edge_trait: true,
            active: true,
            weight: true,
        };
        let mut edge = EdgeData::new(42, 7);
        edge.duration = 1.5;
        edge.location_id = Some(99);
        edge.edge_trait = 3;
        edge.active = false;
        edge.weight = 0.25;

        let mut buf = Vec::new();
        edge.write_binary(&mut buf, &fields, 8).unwrap();
        let back = EdgeData::read_binary(&mut buf.as_slice(), &fields, 8).unwrap();
        assert_eq!(edge, back);
    }

    #[test]
    fn binary_roundtrip_short_pid() {
        let fields = EdgeFields::default();
        let edge = EdgeData::new(123, 456);
        let mut buf = Vec::new();
        edge.write_binary(&mut buf, &fields, 4).unwrap();
        let back = EdgeData::read_binary(&mut buf.as_slice(), &fields, 4).unwrap();
        assert_eq!(edge.key(), back.key());
    }
}
