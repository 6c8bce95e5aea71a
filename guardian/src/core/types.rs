//! Shared deterministic types for the guardian core.
//!
//! These types define stable contracts between core components and the
//! persisted ledger format. They must not depend on I/O and must serialize
//! identically across runs.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A point on the degradation ladder.
///
/// Variant order is ladder order: richest first, fallback last. `Ord` follows
/// declaration order, so sorting plans by code sorts them by richness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PlanCode {
    #[serde(rename = "full")]
    Full,
    #[serde(rename = "saver")]
    Saver,
    #[serde(rename = "minimal")]
    Minimal,
    #[serde(rename = "fallback_dm")]
    FallbackDm,
}

impl PlanCode {
    pub const LADDER: [PlanCode; 4] = [
        PlanCode::Full,
        PlanCode::Saver,
        PlanCode::Minimal,
        PlanCode::FallbackDm,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PlanCode::Full => "full",
            PlanCode::Saver => "saver",
            PlanCode::Minimal => "minimal",
            PlanCode::FallbackDm => "fallback_dm",
        }
    }

    pub fn is_fallback(self) -> bool {
        matches!(self, PlanCode::FallbackDm)
    }
}

impl fmt::Display for PlanCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlanCode::LADDER
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| format!("unknown plan '{s}' (expected full|saver|minimal|fallback_dm)"))
    }
}

/// Billable resource a plan consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    LlmTokens,
    TtsMinutes,
    ImageGenerations,
    RenderMinutes,
    Variants,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::LlmTokens,
        ResourceKind::TtsMinutes,
        ResourceKind::ImageGenerations,
        ResourceKind::RenderMinutes,
        ResourceKind::Variants,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::LlmTokens => "llm_tokens",
            ResourceKind::TtsMinutes => "tts_minutes",
            ResourceKind::ImageGenerations => "image_generations",
            ResourceKind::RenderMinutes => "render_minutes",
            ResourceKind::Variants => "variants",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown resource '{s}'"))
    }
}

/// Quality tier selecting which rate table row prices a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Premium,
    Standard,
    Economy,
}

impl QualityTier {
    pub fn as_str(self) -> &'static str {
        match self {
            QualityTier::Premium => "premium",
            QualityTier::Standard => "standard",
            QualityTier::Economy => "economy",
        }
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "premium" => Ok(QualityTier::Premium),
            "standard" => Ok(QualityTier::Standard),
            "economy" => Ok(QualityTier::Economy),
            other => Err(format!("unknown tier '{other}' (expected premium|standard|economy)")),
        }
    }
}

/// Fixed resource quantities for one plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceQuantities {
    pub llm_tokens: u64,
    pub tts_minutes: u64,
    pub image_generations: u64,
    pub render_minutes: u64,
    pub variants: u64,
}

impl ResourceQuantities {
    pub fn get(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::LlmTokens => self.llm_tokens,
            ResourceKind::TtsMinutes => self.tts_minutes,
            ResourceKind::ImageGenerations => self.image_generations,
            ResourceKind::RenderMinutes => self.render_minutes,
            ResourceKind::Variants => self.variants,
        }
    }

    /// Quantities in `ResourceKind::ALL` order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, u64)> + '_ {
        ResourceKind::ALL.into_iter().map(|kind| (kind, self.get(kind)))
    }

    /// True if every component is at least the other's.
    pub fn dominates(&self, other: &ResourceQuantities) -> bool {
        self.iter().all(|(kind, qty)| qty >= other.get(kind))
    }
}

/// A named rung on the degradation ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDefinition {
    pub code: PlanCode,
    pub tier: QualityTier,
    #[serde(flatten)]
    pub resources: ResourceQuantities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeKind {
    #[default]
    Short,
    Longform,
    Special,
}

impl FromStr for EpisodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short" => Ok(EpisodeKind::Short),
            "longform" => Ok(EpisodeKind::Longform),
            "special" => Ok(EpisodeKind::Special),
            other => Err(format!("unknown episode kind '{other}'")),
        }
    }
}

/// Orchestrator-supplied attributes of the episode being decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeAttributes {
    pub episode_id: String,
    pub kind: EpisodeKind,
    /// 0 (filler) to 10 (flagship).
    pub importance: u8,
    /// Orchestrator flagged the episode as part of an event arc.
    pub is_event_arc: bool,
    /// Planned publish time; checked against event arc windows.
    pub scheduled_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
}

/// Who committed a plan record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decider {
    Selector,
    Outage,
    Admin { name: String },
}

impl fmt::Display for Decider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decider::Selector => f.write_str("selector"),
            Decider::Outage => f.write_str("outage"),
            Decider::Admin { name } => write!(f, "admin:{name}"),
        }
    }
}

/// One priced resource component of an estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostLine {
    pub resource: ResourceKind,
    pub quantity: u64,
    /// Unit cost in millicents (1/1000 cent).
    pub unit_cost_millicents: u64,
    /// Rounded up to a whole cent.
    pub subtotal_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub plan: PlanCode,
    pub breakdown: Vec<CostLine>,
    pub total_cents: i64,
}
