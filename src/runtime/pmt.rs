use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;

/// Polymorphic message type, carried over message ports.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pmt {
    /// Control message that marks the end of an upstream message stream.
    Finished,
    Null,
    String(String),
    Bool(bool),
    U32(u32),
    U64(u64),
    Usize(usize),
    F32(f32),
    F64(f64),
    VecF32(Vec<f32>),
    VecU64(Vec<u64>),
    Blob(Vec<u8>),
    VecPmt(Vec<Pmt>),
    MapStrPmt(HashMap<String, Pmt>),
}

impl Pmt {
    /// Is this a string?
    pub fn is_string(&self) -> bool {
        matches!(self, Pmt::String(_))
    }

    /// The string, if this is one.
    pub fn to_string(&self) -> Option<String> {
        match &self {
            Pmt::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Parse a value of the given kind from a string.
    pub fn from_string(s: &str, t: &PmtKind) -> Option<Pmt> {
        match t {
            PmtKind::Null => Some(Pmt::Null),
            PmtKind::String => Some(Pmt::String(s.to_string())),
            PmtKind::Bool => s.parse::<bool>().ok().map(Pmt::Bool),
            PmtKind::U32 => s.parse::<u32>().ok().map(Pmt::U32),
            PmtKind::U64 => s.parse::<u64>().ok().map(Pmt::U64),
            PmtKind::Usize => s.parse::<usize>().ok().map(Pmt::Usize),
            PmtKind::F32 => s.parse::<f32>().ok().map(Pmt::F32),
            PmtKind::F64 => s.parse::<f64>().ok().map(Pmt::F64),
            _ => None,
        }
    }

    /// Kind of this value.
    pub fn kind(&self) -> PmtKind {
        match self {
            Pmt::Finished => PmtKind::Finished,
            Pmt::Null => PmtKind::Null,
            Pmt::String(_) => PmtKind::String,
            Pmt::Bool(_) => PmtKind::Bool,
            Pmt::U32(_) => PmtKind::U32,
            Pmt::U64(_) => PmtKind::U64,
            Pmt::Usize(_) => PmtKind::Usize,
            Pmt::F32(_) => PmtKind::F32,
            Pmt::F64(_) => PmtKind::F64,
            Pmt::VecF32(_) => PmtKind::VecF32,
            Pmt::VecU64(_) => PmtKind::VecU64,
            Pmt::Blob(_) => PmtKind::Blob,
            Pmt::VecPmt(_) => PmtKind::VecPmt,
            Pmt::MapStrPmt(_) => PmtKind::MapStrPmt,
        }
    }
}

impl From<()> for Pmt {
    fn from(_: ()) -> Self {
        Pmt::Null
    }
}

impl From<bool> for Pmt {
    fn from(v: bool) -> Self {
        Pmt::Bool(v)
    }
}

impl From<u32> for Pmt {
    fn from(v: u32) -> Self {
        Pmt::U32(v)
    }
}

impl From<u64> for Pmt {
    fn from(v: u64) -> Self {
        Pmt::U64(v)
    }
}

impl From<usize> for Pmt {
    fn from(v: usize) -> Self {
        Pmt::Usize(v)
    }
}

impl From<f32> for Pmt {
    fn from(v: f32) -> Self {
        Pmt::F32(v)
    }
}

impl From<f64> for Pmt {
    fn from(v: f64) -> Self {
        Pmt::F64(v)
    }
}

impl From<&str> for Pmt {
    fn from(v: &str) -> Self {
        Pmt::String(v.to_string())
    }
}

impl From<String> for Pmt {
    fn from(v: String) -> Self {
        Pmt::String(v)
    }
}

impl From<Vec<u8>> for Pmt {
    fn from(v: Vec<u8>) -> Self {
        Pmt::Blob(v)
    }
}

/// Discriminant of [`Pmt`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmtKind {
    Finished,
    Null,
    String,
    Bool,
    U32,
    U64,
    Usize,
    F32,
    F64,
    VecF32,
    VecU64,
    Blob,
    VecPmt,
    MapStrPmt,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pmt() {
        let p = Pmt::Null;
        assert!(!p.is_string());
        assert_eq!(p.to_string(), None);
        let p = Pmt::String("foo".to_owned());
        assert!(p.is_string());
        assert_eq!(p.to_string(), Some("foo".to_owned()));
    }

    #[test]
    fn parse() {
        assert_eq!(Pmt::from_string("12", &PmtKind::U32), Some(Pmt::U32(12)));
        assert_eq!(Pmt::from_string("x", &PmtKind::F32), None);
        assert_eq!(Pmt::from(true).kind(), PmtKind::Bool);
    }

    #[test]
    fn map_str_pmt() {
        let msp = Pmt::MapStrPmt(HashMap::from([
            ("str".to_owned(), Pmt::String("a string".to_owned())),
            (
                "submap".to_owned(),
                Pmt::MapStrPmt(HashMap::from([("U32".to_owned(), Pmt::U32(42))])),
            ),
        ]));

        let Pmt::MapStrPmt(m) = msp else {
            panic!("Not a Pmt::MapStrPmt");
        };
        let Some(Pmt::MapStrPmt(sm)) = m.get("submap") else {
            panic!("Could not get submap");
        };
        assert_eq!(sm.get("U32"), Some(&Pmt::U32(42)));
    }
}
