//! Agent catalog
//!
//! The six remote agents foreman can orchestrate, with the wire routes and
//! artifact field names each one uses on the executor. Two flows exist per
//! agent: the primary flow (checkpoint workflow for gated agents,
//! fire-and-poll task for direct agents) and a legacy flow kept from the
//! first generation of the backend (fire-and-poll for jeff/sue, synchronous
//! read endpoints for the rest). Both are valid ways to start a run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// The agents available on the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Sales/SDR: lead scraping and cold outreach (gated)
    Jeff,
    /// Pricing: margin analysis and strategy
    Penny,
    /// PPC: campaign ACOS/ROAS optimization
    Adam,
    /// Support: policy retrieval and drafted replies (gated)
    Sue,
    /// Inventory: stock checks and PO drafting
    Ivan,
    /// SEO: listing/site audits
    Lisa,
}

/// Whether a workflow pauses for human review before its side effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    /// Runs to completion without review
    Direct,
    /// Halts at a checkpoint for approval before finalizing
    Gated,
}

/// How a run is started on the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartRoute {
    /// POST; responds with either a review checkpoint or a task id
    Workflow(&'static str),
    /// POST; responds with a task id to poll
    Task(&'static str),
    /// GET; responds with the finished result synchronously.
    /// Path may contain `{param}` segments filled from input params.
    Read(&'static str),
}

/// Wire field names for a gated agent's reviewable artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactFields {
    /// Supporting context shown alongside the draft (e.g. `prospect`)
    pub context: &'static str,
    /// The editable draft content (e.g. `email_draft`)
    pub draft: &'static str,
    /// Request field carrying the human-edited content on approve
    pub edited: &'static str,
    /// Response field carrying the finalized artifact
    pub finalized: &'static str,
}

/// Everything the orchestration engine needs to know about one agent flow
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub kind: AgentKind,
    pub workflow: WorkflowKind,
    pub route: StartRoute,
    /// Present for gated flows only
    pub artifact: Option<ArtifactFields>,
    pub description: &'static str,
}

const JEFF_ARTIFACT: ArtifactFields = ArtifactFields {
    context: "prospect",
    draft: "email_draft",
    edited: "edited_email",
    finalized: "final_email",
};

const SUE_ARTIFACT: ArtifactFields = ArtifactFields {
    context: "policy_retrieved",
    draft: "draft_reply",
    edited: "edited_reply",
    finalized: "final_reply",
};

impl AgentKind {
    /// All agents, in dashboard order
    pub fn all() -> [AgentKind; 6] {
        [
            AgentKind::Jeff,
            AgentKind::Penny,
            AgentKind::Adam,
            AgentKind::Sue,
            AgentKind::Ivan,
            AgentKind::Lisa,
        ]
    }

    /// Get the name of this agent
    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::Jeff => "jeff",
            AgentKind::Penny => "penny",
            AgentKind::Adam => "adam",
            AgentKind::Sue => "sue",
            AgentKind::Ivan => "ivan",
            AgentKind::Lisa => "lisa",
        }
    }

    /// The primary flow for this agent
    pub fn spec(&self) -> AgentSpec {
        match self {
            AgentKind::Jeff => AgentSpec {
                kind: *self,
                workflow: WorkflowKind::Gated,
                route: StartRoute::Workflow("/agents/jeff/start-workflow"),
                artifact: Some(JEFF_ARTIFACT),
                description: "Lead scraping & outreach with human approval",
            },
            AgentKind::Penny => AgentSpec {
                kind: *self,
                workflow: WorkflowKind::Direct,
                route: StartRoute::Task("/agents/penny/analyze"),
                artifact: None,
                description: "Margin analysis and pricing strategy",
            },
            AgentKind::Adam => AgentSpec {
                kind: *self,
                workflow: WorkflowKind::Direct,
                route: StartRoute::Task("/agents/adam/optimize"),
                artifact: None,
                description: "Campaign ACOS/ROAS optimization",
            },
            AgentKind::Sue => AgentSpec {
                kind: *self,
                workflow: WorkflowKind::Gated,
                route: StartRoute::Workflow("/agents/sue/start-workflow"),
                artifact: Some(SUE_ARTIFACT),
                description: "Policy retrieval + drafted reply with human approval",
            },
            AgentKind::Ivan => AgentSpec {
                kind: *self,
                workflow: WorkflowKind::Direct,
                route: StartRoute::Task("/agents/ivan/check-stock"),
                artifact: None,
                description: "Stock check and PO drafting",
            },
            AgentKind::Lisa => AgentSpec {
                kind: *self,
                workflow: WorkflowKind::Direct,
                route: StartRoute::Task("/agents/lisa/audit"),
                artifact: None,
                description: "Website SEO audit and recommendations",
            },
        }
    }

    /// The legacy flow for this agent, where one survives.
    ///
    /// Jeff's legacy campaign is a plain fire-and-poll run with no review
    /// step; sue's legacy ticket flow still gates, but the checkpoint
    /// arrives in the poll result instead of the start response. The four
    /// direct agents keep synchronous read endpoints.
    pub fn legacy_spec(&self) -> AgentSpec {
        match self {
            AgentKind::Jeff => AgentSpec {
                kind: *self,
                workflow: WorkflowKind::Direct,
                route: StartRoute::Task("/agents/jeff/start-campaign"),
                artifact: None,
                description: "Lead scraping campaign (no review step)",
            },
            AgentKind::Penny => AgentSpec {
                kind: *self,
                workflow: WorkflowKind::Direct,
                route: StartRoute::Read("/agents/penny/repricing-log"),
                artifact: None,
                description: "Repricing log against competitor prices",
            },
            AgentKind::Adam => AgentSpec {
                kind: *self,
                workflow: WorkflowKind::Direct,
                route: StartRoute::Read("/agents/adam/audit-account"),
                artifact: None,
                description: "Account-wide ad audit",
            },
            AgentKind::Sue => AgentSpec {
                kind: *self,
                workflow: WorkflowKind::Gated,
                route: StartRoute::Task("/agents/sue/handle-ticket"),
                artifact: Some(SUE_ARTIFACT),
                description: "Ticket handling; draft arrives via polling",
            },
            AgentKind::Ivan => AgentSpec {
                kind: *self,
                workflow: WorkflowKind::Direct,
                route: StartRoute::Read("/agents/ivan/forecast"),
                artifact: None,
                description: "Stockout forecast across all SKUs",
            },
            AgentKind::Lisa => AgentSpec {
                kind: *self,
                workflow: WorkflowKind::Direct,
                route: StartRoute::Read("/agents/lisa/audit-listing/{sku}"),
                artifact: None,
                description: "Single-listing SEO audit",
            },
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for AgentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "jeff" => Ok(AgentKind::Jeff),
            "penny" => Ok(AgentKind::Penny),
            "adam" => Ok(AgentKind::Adam),
            "sue" => Ok(AgentKind::Sue),
            "ivan" => Ok(AgentKind::Ivan),
            "lisa" => Ok(AgentKind::Lisa),
            other => Err(Error::UnknownAgent(other.to_string())),
        }
    }
}

impl AgentSpec {
    /// Whether this flow pauses for human review
    pub fn is_gated(&self) -> bool {
        self.workflow == WorkflowKind::Gated
    }

    /// Executor path for the approve call
    pub fn approve_path(&self) -> String {
        format!("/agents/{}/approve", self.kind.name())
    }

    /// Executor path for the reject call
    pub fn reject_path(&self) -> String {
        format!("/agents/{}/reject", self.kind.name())
    }
}
