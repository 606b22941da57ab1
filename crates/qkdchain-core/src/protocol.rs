//! Protocol variants and measurement bases.

use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::QkdError;

/// Measurement / preparation basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Basis {
    X,
    Z,
}

impl Basis {
    /// Both bases, in the order used to index basis-pair tables.
    pub const ALL: [Basis; 2] = [Basis::X, Basis::Z];

    /// Draw a basis uniformly at random.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.random::<bool>() {
            Basis::X
        } else {
            Basis::Z
        }
    }

    /// 0 for X, 1 for Z.
    pub fn index(self) -> usize {
        match self {
            Basis::X => 0,
            Basis::Z => 1,
        }
    }
}

impl std::fmt::Display for Basis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X => write!(f, "X"),
            Self::Z => write!(f, "Z"),
        }
    }
}

/// QKD protocol variant driving how each run consumes the register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// Prepare-and-measure: one qubit swapped `length` positions along the chain.
    #[serde(rename = "BB84")]
    Bb84,
    /// Entanglement-based: one leg of a Bell pair swapped along the chain.
    #[serde(rename = "BBM92")]
    Bbm92,
    /// BB84 with `length` identity gates in place of routing, on the full device.
    #[serde(rename = "Id-BB84")]
    IdBb84,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Protocol::Bb84, Protocol::Bbm92, Protocol::IdBb84];

    /// Whether runs are routed along the curated chain. Id-BB84 keeps its
    /// qubit in place and addresses the whole device instead.
    pub fn routes_along_chain(self) -> bool {
        !matches!(self, Protocol::IdBb84)
    }

    /// Whether Alice's bit is drawn at preparation time. For BBM92 it is only
    /// known once the entangled pair has been measured.
    pub fn alice_bit_known_at_preparation(self) -> bool {
        !matches!(self, Protocol::Bbm92)
    }

    pub fn name(self) -> &'static str {
        match self {
            Protocol::Bb84 => "BB84",
            Protocol::Bbm92 => "BBM92",
            Protocol::IdBb84 => "Id-BB84",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = QkdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bb84" => Ok(Protocol::Bb84),
            "bbm92" => Ok(Protocol::Bbm92),
            "id-bb84" | "idbb84" | "id_bb84" => Ok(Protocol::IdBb84),
            _ => Err(QkdError::UnknownProtocol(s.to_string())),
        }
    }
}
