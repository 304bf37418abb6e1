use crate::error::{Error, Result};
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Packed categorical features of a node, edge or activity. All features of
/// one trait share a single 32-bit word; each feature owns a contiguous run
/// of bits.
pub type TraitData = u32;

/// A feature value as (mask, pre-shifted bits). Comparing against a packed
/// word never needs the feature definition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TraitValue {
    pub mask: TraitData,
    pub value: TraitData,
}

impl TraitValue {
    pub fn matches(&self, data: TraitData) -> bool {
        data & self.mask == self.value
    }

    /// Overwrite the feature's bits in `data` with this value.
    pub fn apply(&self, data: TraitData) -> TraitData {
        (data & !self.mask) | self.value
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDef {
    pub id: String,
    #[serde(default)]
    pub annotation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDef {
    pub id: String,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(rename = "enums")]
    pub enums: Vec<EnumDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraitDef {
    pub id: String,
    pub features: Vec<FeatureDef>,
}

/// A single feature: a named run of bits within the trait word and the
/// enumeration values it can take.
#[derive(Debug, Clone, Getters)]
pub struct Feature {
    #[getset(get = "pub")]
    id: String,
    mask: TraitData,
    shift: u32,
    enum_ids: Vec<String>,
    default_index: usize,
}

impl Feature {
    pub fn mask(&self) -> TraitData {
        self.mask
    }

    /// Number of enumeration values.
    pub fn size(&self) -> usize {
        self.enum_ids.len()
    }

    /// The (mask, value) pair for the enum with the given index.
    pub fn value_of(&self, index: usize) -> TraitValue {
        TraitValue {
            mask: self.mask,
            value: (index as TraitData) << self.shift,
        }
    }

    pub fn default_value(&self) -> TraitValue {
        self.value_of(self.default_index)
    }

    /// Look up an enum by id and return its packed value.
    pub fn value_by_id(&self, id: &str) -> Option<TraitValue> {
        self.enum_ids
            .iter()
            .position(|e| e == id)
            .map(|i| self.value_of(i))
    }

    /// Decode the enum index stored in `data`.
    pub fn index_of(&self, data: TraitData) -> usize {
        ((data & self.mask) >> self.shift) as usize
    }

    /// Decode the enum id stored in `data`.
    pub fn enum_id(&self, data: TraitData) -> &str {
        let index = self.index_of(data);
        self.enum_ids
            .get(index)
            .map(|s| s.as_str())
            .unwrap_or("?")
    }
}

/// A trait: an ordered list of features packed into one 32-bit word.
#[derive(Debug, Clone, Getters)]
pub struct Trait {
    #[getset(get = "pub")]
    id: String,
    features: Vec<Feature>,
    bits: u32,
}

impl Trait {
    pub fn new(def: &TraitDef) -> Result<Self> {
        let mut features = Vec::with_capacity(def.features.len());
        let mut shift = 0u32;

        for feature in &def.features {
            let count = feature.enums.len().max(1);
            let width = (usize::BITS - (count - 1).leading_zeros()).max(1);

            if shift + width > 32 {
                return Err(Error::semantic(format!(
                    "trait '{}': features exceed 32 bits",
                    def.id
                )));
            }

            let mask = (((1u64 << width) - 1) as TraitData) << shift;
            let enum_ids: Vec<String> = feature.enums.iter().map(|e| e.id.clone()).collect();
            let default_index = match &feature.default {
                Some(id) => enum_ids.iter().position(|e| e == id).ok_or_else(|| {
                    Error::semantic(format!(
                        "trait '{}': feature '{}': unknown default '{}'",
                        def.id, feature.id, id
                    ))
                })?,
                None => 0,
            };

            features.push(Feature {
                id: feature.id.clone(),
                mask,
                shift,
                enum_ids,
                default_index,
            });
            shift += width;
        }

        Ok(Trait {
            id: def.id.clone(),
            features,
            bits: shift,
        })
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn feature(&self, id: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.id() == id)
    }

    /// The word with every feature set to its default enum.
    pub fn default_data(&self) -> TraitData {
        let mut data = 0;
        for feature in &self.features {
            data = feature.default_value().apply(data);
        }
        data
    }

    /// Parse the textual encoding `feature:enum[|feature:enum…]` used by the
    /// contact network text format. An empty string yields the defaults.
    pub fn data_from_text(&self, text: &str) -> Result<TraitData> {
        let mut data = self.default_data();

        if text.is_empty() || text == "-" {
            return Ok(data);
        }

        for part in text.split('|') {
            let mut it = part.splitn(2, ':');
            let feature_id = it.next().unwrap_or("");
            let enum_id = it.next().unwrap_or("");
            let feature = self.feature(feature_id).ok_or_else(|| {
                Error::semantic(format!("trait '{}': unknown feature '{}'", self.id, feature_id))
            })?;
            let value = feature.value_by_id(enum_id).ok_or_else(|| {
                Error::semantic(format!(
                    "trait '{}': feature '{}': unknown enum '{}'",
                    self.id, feature_id, enum_id
                ))
            })?;
            data = value.apply(data);
        }

        Ok(data)
    }

    /// Render a packed word in the textual encoding.
    pub fn data_to_text(&self, data: TraitData) -> String {
        let mut parts = Vec::with_capacity(self.features.len());
        for feature in &self.features {
            parts.push(format!("{}:{}", feature.id(), feature.enum_id(data)));
        }
        parts.join("|")
    }
}

/// All traits known to a run: the activity trait, the edge trait, and any
/// node traits declared in the traits file.
#[derive(Debug, Clone, Default)]
pub struct TraitRegistry {
    traits: HashMap<String, Trait>,
}

impl TraitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: &TraitDef) -> Result<()> {
        let t = Trait::new(def)?;
        self.traits.insert(t.id().clone(), t);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Trait> {
        self.traits.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&Trait> {
        self.get(id)
            .ok_or_else(|| Error::semantic(format!("unknown trait '{}'", id)))
    }

    pub fn len(&self) -> usize {
        self.traits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity_def() -> TraitDef {
        serde_json::from_str(
            r#"{
              "id": "activityTrait",
              "features": [
                {
                  "id": "activityType",
                  "default": "other",
                  "enums": [
                    {"id": "home"},
                    {"id": "work"},
                    {"id": "school"},
                    {"id": "other"}
                  ]
                }
              ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn pack_and_unpack() {
        let t = Trait::new(&activity_def()).unwrap();
        assert_eq!(t.bits(), 2);

        let feature = t.feature("activityType").unwrap();
        let work = feature.value_by_id("work").unwrap();
        let data = work.apply(0);
        assert!(work.matches(data));
        assert_eq!(feature.enum_id(data), "work");
    }

    #[test]
    fn defaults_and_text_roundtrip() {
        let t = Trait::new(&activity_def()).unwrap();
        let data = t.default_data();
        assert_eq!(t.feature("activityType").unwrap().enum_id(data), "other");

        let parsed = t.data_from_text("activityType:school").unwrap();
        assert_eq!(t.data_to_text(parsed), "activityType:school");
        assert!(t.data_from_text("activityType:nope").is_err());
    }

    #[test]
    fn multiple_features_do_not_overlap() {
        let def: TraitDef = serde_json::from_str(
            r#"{
              "id": "edgeTrait",
              "features": [
                {"id": "a", "enums": [{"id": "x"}, {"id": "y"}, {"id": "z"}]},
                {"id": "b", "enums": [{"id": "p"}, {"id": "q"}]}
              ]
            }"#,
        )
        .unwrap();
        let t = Trait::new(&def).unwrap();
        let a = t.feature("a").unwrap();
        let b = t.feature("b").unwrap();
        assert_eq!(a.mask() & b.mask(), 0);

        let data = b.value_by_id("q").unwrap().apply(a.value_by_id("z").unwrap().apply(0));
        assert_eq!(a.enum_id(data), "z");
        assert_eq!(b.enum_id(data), "q");
    }
}
