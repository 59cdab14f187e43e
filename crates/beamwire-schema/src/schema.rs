use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::field::{FieldDescriptor, Multiplicity, PrimitiveKind};

/// The fixed, ordered field layout of one message type.
///
/// Defined once per pipeline edge and shared out-of-band between producer
/// and consumer; it is never re-sent per message. The fingerprint rides in
/// every frame's version word so a schema revision skew between the two
/// ends fails loudly at the first message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    name: String,
    version: i32,
    fields: Vec<FieldDescriptor>,
}

impl Schema {
    /// Validate and define a schema.
    pub fn define(name: &str, version: i32, fields: Vec<FieldDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateFieldName(field.name.clone()));
            }
            if matches!(field.multiplicity, Multiplicity::Variable { initial: None }) {
                return Err(SchemaError::UnresolvedVariableMultiplicity(
                    field.name.clone(),
                ));
            }
        }
        Ok(Self {
            name: name.to_string(),
            version,
            fields,
        })
    }

    /// The schema's logical record name (the top-level frame tag).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The schema's declared revision.
    pub fn version(&self) -> i32 {
        self.version
    }

    /// The ordered field list.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Index of a field by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    /// Per-field element counts at materialization time.
    pub(crate) fn initial_counts(&self) -> Vec<u32> {
        self.fields
            .iter()
            .map(|field| match field.multiplicity {
                Multiplicity::Fixed(count) => count,
                // `define` guarantees the hint is resolved.
                Multiplicity::Variable { initial } => initial.unwrap_or(0),
            })
            .collect()
    }

    /// FNV-1a digest over the layout-relevant schema content, folded into
    /// an i32 so it fits the frame version word.
    ///
    /// Fixed counts participate; variable counts do not (they adapt per
    /// message).
    pub fn fingerprint(&self) -> i32 {
        let mut hash = fnv1a(0x811c_9dc5, self.name.as_bytes());
        hash = fnv1a(hash, &self.version.to_ne_bytes());
        for field in &self.fields {
            hash = fnv1a(hash, field.name.as_bytes());
            hash = fnv1a(hash, &[field.kind as u8]);
            match field.multiplicity {
                Multiplicity::Fixed(count) => {
                    hash = fnv1a(hash, &[0x01]);
                    hash = fnv1a(hash, &count.to_ne_bytes());
                }
                Multiplicity::Variable { .. } => {
                    hash = fnv1a(hash, &[0x02]);
                }
            }
        }
        hash as i32
    }

    /// Serialize for out-of-band interchange (negotiation tooling, config).
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and re-validate an interchange document.
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: Self = serde_json::from_str(json)?;
        Self::define(&parsed.name, parsed.version, parsed.fields)
    }
}

fn fnv1a(mut hash: u32, bytes: &[u8]) -> u32 {
    for &byte in bytes {
        hash = (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193);
    }
    hash
}

/// Bytes one field occupies in a materialized buffer at element count
/// `count`: bare width for scalars, a u32 count word plus packed or
/// element-wise data for sequences, a u32 length word plus capacity bytes
/// for strings.
pub(crate) fn field_size(field: &FieldDescriptor, count: u32) -> usize {
    let count = count as usize;
    match field.kind {
        PrimitiveKind::String => 4 + count,
        PrimitiveKind::Bool if field.is_sequence() => 4 + count.div_ceil(8),
        _ if !field.is_sequence() => field.kind.width(),
        kind => 4 + count * kind.width(),
    }
}

/// Byte offsets for every field plus the total body length.
pub(crate) fn compute_offsets(fields: &[FieldDescriptor], counts: &[u32]) -> (Vec<usize>, usize) {
    let mut offsets = Vec::with_capacity(fields.len());
    let mut at = 0usize;
    for (field, &count) in fields.iter().zip(counts) {
        offsets.push(at);
        at += field_size(field, count);
    }
    (offsets, at)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::scalar("id", PrimitiveKind::Int32),
            FieldDescriptor::array("gains", PrimitiveKind::Float64, 4),
            FieldDescriptor::variable("payload", PrimitiveKind::Char, 8),
        ]
    }

    #[test]
    fn duplicate_field_name_rejected() {
        let fields = vec![
            FieldDescriptor::scalar("id", PrimitiveKind::Int32),
            FieldDescriptor::scalar("id", PrimitiveKind::Float32),
        ];
        assert!(matches!(
            Schema::define("msg", 1, fields),
            Err(SchemaError::DuplicateFieldName(name)) if name == "id"
        ));
    }

    #[test]
    fn unresolved_variable_multiplicity_rejected() {
        let fields = vec![FieldDescriptor {
            name: "blob".to_string(),
            kind: PrimitiveKind::Char,
            multiplicity: Multiplicity::Variable { initial: None },
        }];
        assert!(matches!(
            Schema::define("msg", 1, fields),
            Err(SchemaError::UnresolvedVariableMultiplicity(name)) if name == "blob"
        ));
    }

    #[test]
    fn offsets_are_declaration_ordered() {
        let schema = Schema::define("msg", 1, sample_fields()).unwrap();
        let counts = schema.initial_counts();
        let (offsets, total) = compute_offsets(schema.fields(), &counts);

        assert_eq!(offsets, vec![0, 4, 4 + 4 + 32]);
        // id (4) + gains count word + 4 f64 (36) + payload count word + 8 bytes (12)
        assert_eq!(total, 4 + 36 + 12);
    }

    #[test]
    fn fingerprint_tracks_layout_not_variable_counts() {
        let a = Schema::define("msg", 1, sample_fields()).unwrap();

        let mut grown = sample_fields();
        grown[2] = FieldDescriptor::variable("payload", PrimitiveKind::Char, 512);
        let b = Schema::define("msg", 1, grown).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut reshaped = sample_fields();
        reshaped[1] = FieldDescriptor::array("gains", PrimitiveKind::Float64, 8);
        let c = Schema::define("msg", 1, reshaped).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());

        let d = Schema::define("msg", 2, sample_fields()).unwrap();
        assert_ne!(a.fingerprint(), d.fingerprint());
    }

    #[test]
    fn json_interchange_roundtrip() {
        let schema = Schema::define("cal.solution", 3, sample_fields()).unwrap();
        let json = schema.to_json().unwrap();
        let back = Schema::from_json(&json).unwrap();
        assert_eq!(back, schema);
        assert_eq!(back.fingerprint(), schema.fingerprint());
    }

    #[test]
    fn from_json_revalidates() {
        let schema = Schema::define("msg", 1, sample_fields()).unwrap();
        let json = schema.to_json().unwrap().replace("payload", "id");
        assert!(matches!(
            Schema::from_json(&json),
            Err(SchemaError::DuplicateFieldName(_))
        ));
    }
}
