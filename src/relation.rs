//! Syntactic relation labels
//!
//! Every collocation is stored in two views: the canonical one and its
//! inverse (lemma1 and lemma2 swapped). Asymmetric relations address the
//! inverse view as `~LABEL`; for symmetric relations both views share the
//! plain label.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Relation {
    /// Adverbial modification
    Adv,
    /// Attributive adjective
    Attr,
    /// Genitive attribute
    Gmod,
    /// Comparative group ("als", "wie")
    Kom,
    /// Coordination
    Kon,
    /// Accusative object
    Obj,
    /// Prepositional group
    Pp,
    /// Predicative
    Pred,
    /// Active subject
    Subja,
    /// Passive subject
    Subjp,
    /// Separable verb particle
    Vz,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown relation: {0}")]
pub struct UnknownRelation(pub String);

impl Relation {
    pub const ALL: [Relation; 11] = [
        Relation::Adv,
        Relation::Attr,
        Relation::Gmod,
        Relation::Kom,
        Relation::Kon,
        Relation::Obj,
        Relation::Pp,
        Relation::Pred,
        Relation::Subja,
        Relation::Subjp,
        Relation::Vz,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Relation::Adv => "ADV",
            Relation::Attr => "ATTR",
            Relation::Gmod => "GMOD",
            Relation::Kom => "KOM",
            Relation::Kon => "KON",
            Relation::Obj => "OBJ",
            Relation::Pp => "PP",
            Relation::Pred => "PRED",
            Relation::Subja => "SUBJA",
            Relation::Subjp => "SUBJP",
            Relation::Vz => "VZ",
        }
    }

    /// Symmetric relations keep one canonical row regardless of word order
    pub fn is_symmetric(self) -> bool {
        matches!(self, Relation::Kon)
    }

    /// The two high-volume relations left out of the META overview
    pub fn is_meta_excluded(self) -> bool {
        matches!(self, Relation::Pp | Relation::Vz)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = UnknownRelation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Relation::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownRelation(s.to_string()))
    }
}

impl Serialize for Relation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A relation seen from one side: canonical or inverse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationView {
    pub relation: Relation,
    pub inverse: bool,
}

impl RelationView {
    pub fn new(relation: Relation, inverse: bool) -> Self {
        // symmetric relations have a single view
        let inverse = inverse && !relation.is_symmetric();
        Self { relation, inverse }
    }

    /// Value of the `inv` column to select, or None for both views
    pub fn inverse_filter(self) -> Option<bool> {
        if self.relation.is_symmetric() {
            None
        } else {
            Some(self.inverse)
        }
    }
}

impl fmt::Display for RelationView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inverse {
            write!(f, "~{}", self.relation)
        } else {
            write!(f, "{}", self.relation)
        }
    }
}

impl FromStr for RelationView {
    type Err = UnknownRelation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix('~') {
            Some(rest) => Ok(RelationView::new(rest.parse()?, true)),
            None => Ok(RelationView::new(s.parse()?, false)),
        }
    }
}

impl Serialize for RelationView {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
