//! Connection types and connector descriptors.
//!
//! Every node type declares its connectors (inputs/outputs) with a
//! `ConnType`. The engine uses [`ConnType::accepts`] to decide whether an
//! output may feed an input. Compatibility is directional: it is always
//! evaluated as `output.accepts(input)`, never the other way round.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of value flowing over a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnType {
    /// Input-only wildcard: accepts any resolved output.
    Any,
    /// Polymorphic output that has not been resolved yet. Connects to nothing.
    Variant,
    /// The type of the null datum.
    None,
    /// Generic image; as an input it accepts every image subtype.
    Img,
    /// Three-band RGB image.
    ImgRgb,
    /// Single-band image.
    ImgGrey,
    /// Image with some other number of bands.
    ImgStrange,
    Number,
    Rect,
    /// Opaque structured data.
    Data,
}

impl ConnType {
    /// All connection types, in registry order.
    pub fn all() -> &'static [ConnType] {
        &[
            ConnType::Any,
            ConnType::Variant,
            ConnType::None,
            ConnType::Img,
            ConnType::ImgRgb,
            ConnType::ImgGrey,
            ConnType::ImgStrange,
            ConnType::Number,
            ConnType::Rect,
            ConnType::Data,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            ConnType::Any => "any",
            ConnType::Variant => "variant",
            ConnType::None => "none",
            ConnType::Img => "img",
            ConnType::ImgRgb => "imgrgb",
            ConnType::ImgGrey => "imggrey",
            ConnType::ImgStrange => "imgstrange",
            ConnType::Number => "number",
            ConnType::Rect => "rect",
            ConnType::Data => "data",
        }
    }

    pub fn is_image(self) -> bool {
        matches!(
            self,
            ConnType::Img | ConnType::ImgRgb | ConnType::ImgGrey | ConnType::ImgStrange
        )
    }

    /// Concrete image subtype for a given band count.
    pub fn image_for_bands(bands: usize) -> ConnType {
        match bands {
            1 => ConnType::ImgGrey,
            3 => ConnType::ImgRgb,
            _ => ConnType::ImgStrange,
        }
    }

    /// Can an output of type `self` be connected to an input of type `input`?
    pub fn accepts(self, input: ConnType) -> bool {
        if self == ConnType::Variant || input == ConnType::Variant {
            return false;
        }
        if input == ConnType::Any {
            return true;
        }
        if input == ConnType::Img && self.is_image() {
            return true;
        }
        self == input
    }
}

impl fmt::Display for ConnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConnType::all()
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| format!("unknown connection type '{}'", s))
    }
}

/// Whether a connector is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Descriptor for one of a node type's connectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connector {
    pub name: String,
    pub direction: Direction,
    pub conn_type: ConnType,
    pub description: String,
}

impl Connector {
    pub fn input(name: &str, conn_type: ConnType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            direction: Direction::Input,
            conn_type,
            description: description.to_string(),
        }
    }

    pub fn output(name: &str, conn_type: ConnType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            direction: Direction::Output,
            conn_type,
            description: description.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_accepts_everything_resolved() {
        for &t in ConnType::all() {
            if t != ConnType::Variant {
                assert!(t.accepts(ConnType::Any), "{} should feed any", t);
            }
        }
        assert!(!ConnType::Variant.accepts(ConnType::Any));
    }

    #[test]
    fn test_image_hierarchy_is_one_way() {
        assert!(ConnType::ImgRgb.accepts(ConnType::Img));
        assert!(ConnType::ImgGrey.accepts(ConnType::Img));
        assert!(ConnType::Img.accepts(ConnType::Img));
        assert!(!ConnType::Img.accepts(ConnType::ImgRgb));
        assert!(!ConnType::ImgGrey.accepts(ConnType::ImgRgb));
        assert!(!ConnType::Number.accepts(ConnType::Img));
    }

    #[test]
    fn test_variant_accepts_nothing() {
        for &t in ConnType::all() {
            assert!(!ConnType::Variant.accepts(t));
            assert!(!t.accepts(ConnType::Variant));
        }
    }

    #[test]
    fn test_name_round_trip() {
        for &t in ConnType::all() {
            assert_eq!(t.name().parse::<ConnType>().unwrap(), t);
        }
        assert!("pixel".parse::<ConnType>().is_err());
    }

    #[test]
    fn test_serde_names_match() {
        let json = serde_json::to_string(&ConnType::ImgStrange).unwrap();
        assert_eq!(json, "\"imgstrange\"");
    }

    #[test]
    fn test_image_for_bands() {
        assert_eq!(ConnType::image_for_bands(1), ConnType::ImgGrey);
        assert_eq!(ConnType::image_for_bands(3), ConnType::ImgRgb);
        assert_eq!(ConnType::image_for_bands(11), ConnType::ImgStrange);
    }
}
