//! Core type definitions for supply-chain events.
//!
//! The event tags form a closed vocabulary: every movement of a batch
//! through the chain of custody is exactly one of these. The coarse
//! [`Stage`] is derived from the tag and drives the `batch_refs`
//! secondary index, so a reader can answer "has this batch been through
//! processing?" without scanning transactions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// TransactionType
// ---------------------------------------------------------------------------

/// Discriminant for the supply-chain event a transaction records.
///
/// The wire tags (`BATCH_CREATE`, …) are part of the canonical form and
/// therefore of the hash ABI. Renaming one invalidates every prior hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// A new physical batch enters the system at a cultivation site.
    BatchCreate,
    /// Harvest of a cultivated batch.
    HarvestRecord,
    /// Collection of harvested material from the farm gate.
    CollectionRecord,
    /// Custody handed to a transporter.
    TransportStart,
    /// Custody received at the transport destination.
    TransportEnd,
    /// Drying step at a processing facility.
    DryingRecord,
    /// Grading/quality classification step.
    GradingRecord,
    /// Packing into shippable units.
    PackingRecord,
    /// Distributor takes custody of packed goods.
    DistributionCollect,
    /// Distribution leg completed.
    DistributionComplete,
    /// Exporter takes custody.
    ExportCollect,
    /// Export shipment recorded.
    ExportRecord,
}

impl TransactionType {
    /// All tags, in wire order. Used by stats and by tests that sweep the
    /// vocabulary.
    pub const ALL: [TransactionType; 12] = [
        Self::BatchCreate,
        Self::HarvestRecord,
        Self::CollectionRecord,
        Self::TransportStart,
        Self::TransportEnd,
        Self::DryingRecord,
        Self::GradingRecord,
        Self::PackingRecord,
        Self::DistributionCollect,
        Self::DistributionComplete,
        Self::ExportCollect,
        Self::ExportRecord,
    ];

    /// The wire tag, as hashed and as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BatchCreate => "BATCH_CREATE",
            Self::HarvestRecord => "HARVEST_RECORD",
            Self::CollectionRecord => "COLLECTION_RECORD",
            Self::TransportStart => "TRANSPORT_START",
            Self::TransportEnd => "TRANSPORT_END",
            Self::DryingRecord => "DRYING_RECORD",
            Self::GradingRecord => "GRADING_RECORD",
            Self::PackingRecord => "PACKING_RECORD",
            Self::DistributionCollect => "DISTRIBUTION_COLLECT",
            Self::DistributionComplete => "DISTRIBUTION_COMPLETE",
            Self::ExportCollect => "EXPORT_COLLECT",
            Self::ExportRecord => "EXPORT_RECORD",
        }
    }

    /// The coarse phase this event belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::BatchCreate => Stage::Cultivation,
            Self::HarvestRecord => Stage::Harvest,
            Self::CollectionRecord => Stage::Collection,
            Self::TransportStart | Self::TransportEnd => Stage::Transport,
            Self::DryingRecord | Self::GradingRecord | Self::PackingRecord => Stage::Process,
            Self::DistributionCollect | Self::DistributionComplete => Stage::Distribute,
            Self::ExportCollect | Self::ExportRecord => Stage::Export,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTag(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Coarse supply-chain phase, derived from [`TransactionType`].
///
/// Stored in the `batch_refs` index so per-phase lookups are a single
/// indexed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Cultivation,
    Harvest,
    Collection,
    Transport,
    Process,
    Distribute,
    Export,
}

impl Stage {
    /// All stages, in supply-chain order.
    pub const ALL: [Stage; 7] = [
        Self::Cultivation,
        Self::Harvest,
        Self::Collection,
        Self::Transport,
        Self::Process,
        Self::Distribute,
        Self::Export,
    ];

    /// The stored index tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cultivation => "cultivation",
            Self::Harvest => "harvest",
            Self::Collection => "collection",
            Self::Transport => "transport",
            Self::Process => "process",
            Self::Distribute => "distribute",
            Self::Export => "export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTag(s.to_string()))
    }
}

/// A tag string that is not part of the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tag: {0}")]
pub struct UnknownTag(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tags_roundtrip_through_from_str() {
        for tag in TransactionType::ALL {
            assert_eq!(tag.as_str().parse::<TransactionType>().unwrap(), tag);
        }
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
    }

    #[test]
    fn unknown_tags_rejected() {
        assert!("BATCH_DESTROY".parse::<TransactionType>().is_err());
        assert!("warehouse".parse::<Stage>().is_err());
    }

    #[test]
    fn serde_uses_wire_tags() {
        let json = serde_json::to_string(&TransactionType::DistributionCollect).unwrap();
        assert_eq!(json, "\"DISTRIBUTION_COLLECT\"");
        let back: TransactionType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TransactionType::DistributionCollect);

        let stage = serde_json::to_string(&Stage::Cultivation).unwrap();
        assert_eq!(stage, "\"cultivation\"");
    }

    #[test]
    fn stage_mapping_covers_the_chain_of_custody() {
        assert_eq!(TransactionType::BatchCreate.stage(), Stage::Cultivation);
        assert_eq!(TransactionType::HarvestRecord.stage(), Stage::Harvest);
        assert_eq!(TransactionType::CollectionRecord.stage(), Stage::Collection);
        assert_eq!(TransactionType::TransportStart.stage(), Stage::Transport);
        assert_eq!(TransactionType::TransportEnd.stage(), Stage::Transport);
        assert_eq!(TransactionType::DryingRecord.stage(), Stage::Process);
        assert_eq!(TransactionType::GradingRecord.stage(), Stage::Process);
        assert_eq!(TransactionType::PackingRecord.stage(), Stage::Process);
        assert_eq!(TransactionType::DistributionCollect.stage(), Stage::Distribute);
        assert_eq!(TransactionType::DistributionComplete.stage(), Stage::Distribute);
        assert_eq!(TransactionType::ExportCollect.stage(), Stage::Export);
        assert_eq!(TransactionType::ExportRecord.stage(), Stage::Export);
    }

    #[test]
    fn display_matches_wire_tag() {
        assert_eq!(TransactionType::ExportRecord.to_string(), "EXPORT_RECORD");
        assert_eq!(Stage::Process.to_string(), "process");
    }
}
