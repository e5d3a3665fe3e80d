// Path: crates/types/src/trust.rs

//! Owner-trust and computed-trust scales.
//!
//! Both scales share one numeric ordering so that owner trust can be capped
//! and compared against computed validity directly. The single-character
//! codes are the stable listing vocabulary.

use serde::{Deserialize, Serialize};

/// The computed validity of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum TrustLevel {
    /// Nothing is known about this key.
    Unknown = 0,
    /// The key itself has expired.
    Expired = 1,
    /// No conclusion could be reached.
    Undefined = 2,
    /// The key must not be trusted.
    Never = 3,
    /// The key is marginally valid.
    Marginal = 4,
    /// The key is fully valid.
    Fully = 5,
    /// The key is one of our own.
    Ultimate = 6,
}

impl TrustLevel {
    /// The single-character listing code for this level.
    pub fn letter(self) -> char {
        match self {
            Self::Unknown => 'o',
            Self::Expired => 'e',
            Self::Undefined => 'q',
            Self::Never => 'n',
            Self::Marginal => 'm',
            Self::Fully => 'f',
            Self::Ultimate => 'u',
        }
    }

    /// Reconstructs a level from its masked numeric value.
    pub fn from_raw(v: u8) -> Self {
        match v {
            1 => Self::Expired,
            2 => Self::Undefined,
            3 => Self::Never,
            4 => Self::Marginal,
            5 => Self::Fully,
            6 => Self::Ultimate,
            _ => Self::Unknown,
        }
    }
}

/// The user's assessment of a keyholder as an introducer.
///
/// Stored as the raw numeric value so that bulk import and export round-trip
/// exactly, including values this implementation does not itself assign.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct Ownertrust(pub u8);

impl Ownertrust {
    /// No assignment.
    pub const NONE: Ownertrust = Ownertrust(0);
    /// Do not trust certifications by this holder.
    pub const NEVER: Ownertrust = Ownertrust(3);
    /// Trust certifications marginally.
    pub const MARGINAL: Ownertrust = Ownertrust(4);
    /// Trust certifications fully.
    pub const FULLY: Ownertrust = Ownertrust(5);
    /// This is one of our own keys.
    pub const ULTIMATE: Ownertrust = Ownertrust(6);

    /// Whether an owner trust has been assigned at all.
    pub fn is_set(self) -> bool {
        self.0 != 0
    }

    /// The trust level encoded in the low bits, ignoring any flag bits.
    pub fn level(self) -> TrustLevel {
        TrustLevel::from_raw(self.0 & TRUST_MASK)
    }

    /// The letter code of the assigned value (`-` when unset or unusual).
    pub fn letter(self) -> char {
        match self.level() {
            TrustLevel::Never => 'n',
            TrustLevel::Marginal => 'm',
            TrustLevel::Fully => 'f',
            TrustLevel::Ultimate => 'u',
            _ => '-',
        }
    }
}

/// Mask isolating the trust level from flag bits packed beside it.
pub const TRUST_MASK: u8 = 7;

/// The evaluator's answer: a level plus the revocation overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustVerdict {
    /// The computed trust level.
    pub level: TrustLevel,
    /// Whether the key is revoked; reported alongside any level.
    pub revoked: bool,
}

impl TrustVerdict {
    /// A verdict without the revocation overlay.
    pub fn clean(level: TrustLevel) -> Self {
        Self { level, revoked: false }
    }

    /// The single-character code, with revocation taking precedence.
    pub fn letter(self) -> char {
        if self.revoked {
            'r'
        } else {
            self.level.letter()
        }
    }
}
