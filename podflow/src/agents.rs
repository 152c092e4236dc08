//! The podcast analysis stages.
//!
//! Two lightweight stages read the transcript independently and write the
//! `summary` and `insights` slots. The fact-check stage reads both slots and
//! may call the summarizer, the insights stage and a search-query stage as
//! tools while it verifies claims.

use crate::config::StageTiers;
use crate::errors::DependencyWiringError;
use crate::pipeline::{PipelineBuilder, StageGraph, StageSpec};
use tracing::info;

/// Name of the pipeline built by [`AgentFactory`].
pub const PIPELINE_NAME: &str = "podcast_agent_pipeline";

/// Stage writing the per-episode summary.
pub const SUMMARIZE_STAGE: &str = "summarize";
/// Stage writing takeaways, quotes and topics.
pub const KEY_INSIGHTS_STAGE: &str = "key_insights";
/// Delegate-only stage drafting search queries.
pub const SEARCH_STAGE: &str = "search";
/// Terminal stage verifying claims.
pub const FACT_CHECK_STAGE: &str = "fact_check";

/// Slot written by the summarize stage.
pub const SUMMARY_SLOT: &str = "summary";
/// Slot written by the key insights stage.
pub const INSIGHTS_SLOT: &str = "insights";

const SUMMARIZE_TEMPLATE: &str = "\
You are a specialized podcast summarizer agent.
- Your job is to analyze raw podcast data provided below in JSON format.
- Podcast raw data: {{payload}}
- Generate a summary of each episode (200-300 words) that captures:
    • Core themes
    • Key discussions
    • Outcomes or opinions shared
- Provide the output in a markdown table format with columns for 'Core Themes', 'Key Discussions', and 'Outcomes/Opinions'.";

const KEY_INSIGHTS_TEMPLATE: &str = "\
You are a specialized podcasts key insights agent.
- Your job is to analyze raw podcast data provided below in JSON format.
- Podcast raw data: {{payload}}
- Produce a structured list of:
    • Top 5 takeaways
    • Notable quotes (with timestamps)
    • Topics discussed (tag-style labels)
- Provide the output in a markdown table format with columns for 'Takeaways', 'Quotes', and 'Topics'.";

const SEARCH_TEMPLATE: &str =
    "You specialize in crafting concise Google Search queries to support fact-checking requests.";

const FACT_CHECK_TEMPLATE: &str = "\
You are a fact checker agent.
- Analyze the summarized podcast data and key insights provided below.
- Summary:
{{summary}}
- Key insights:
{{insights}}
- Identify factual statements and verify them using reliable external sources such as Google Search or Wikipedia.
- Mark each statement as:
    • ✅ Verified true
    • ⚠️ Possibly outdated/inaccurate
    • ❓ Unverifiable
- Present results in a markdown table with columns for claim, verification status, and confidence (0-1 scale).";

/// The four stage specifications of the podcast pipeline.
#[derive(Debug, Clone)]
pub struct AgentBundle {
    /// Writes `summary`.
    pub summarize: StageSpec,
    /// Writes `insights`.
    pub key_insights: StageSpec,
    /// Drafts search queries; only callable as a tool.
    pub search: StageSpec,
    /// Verifies claims; the terminal stage.
    pub fact_check: StageSpec,
}

impl AgentBundle {
    /// Returns the specs in declaration order.
    #[must_use]
    pub fn into_specs(self) -> Vec<StageSpec> {
        vec![self.summarize, self.key_insights, self.search, self.fact_check]
    }
}

/// Builds the podcast pipeline's stages.
///
/// Construction has no side effects; the transcript payload is bound when a
/// run renders each stage.
#[derive(Debug, Clone, Default)]
pub struct AgentFactory {
    tiers: StageTiers,
}

impl AgentFactory {
    /// Creates a factory using the given tier per stage.
    #[must_use]
    pub fn new(tiers: StageTiers) -> Self {
        Self { tiers }
    }

    /// Returns the four stage specifications.
    #[must_use]
    pub fn bundle(&self) -> AgentBundle {
        AgentBundle {
            summarize: StageSpec::new(SUMMARIZE_STAGE, self.tiers.summarize, SUMMARIZE_TEMPLATE)
                .with_description("Summarizes each podcast episode: core themes, key discussions, outcomes.")
                .with_output_slot(SUMMARY_SLOT),
            key_insights: StageSpec::new(
                KEY_INSIGHTS_STAGE,
                self.tiers.key_insights,
                KEY_INSIGHTS_TEMPLATE,
            )
            .with_description("Lists the top takeaways, notable quotes with timestamps and topic tags.")
            .with_output_slot(INSIGHTS_SLOT),
            search: StageSpec::new(SEARCH_STAGE, self.tiers.search, SEARCH_TEMPLATE)
                .with_description("Drafts concise web search queries and searches for evidence.")
                .delegate_only()
                .with_grounded_search(),
            fact_check: StageSpec::new(FACT_CHECK_STAGE, self.tiers.fact_check, FACT_CHECK_TEMPLATE)
                .with_description("Verifies factual claims from the summary and insights.")
                .with_delegates([SUMMARIZE_STAGE, KEY_INSIGHTS_STAGE, SEARCH_STAGE]),
        }
    }

    /// Builds and validates the stage graph.
    pub fn build(&self) -> Result<StageGraph, DependencyWiringError> {
        let graph = Self::assemble(self.bundle().into_specs())?;
        info!(
            pipeline = PIPELINE_NAME,
            stages = graph.stage_count(),
            terminal = %graph.terminal().name,
            "Initialized agent bundle for podcast workflow"
        );
        Ok(graph)
    }

    /// Validates an arbitrary ordering of stage specifications.
    pub fn assemble(
        specs: impl IntoIterator<Item = StageSpec>,
    ) -> Result<StageGraph, DependencyWiringError> {
        PipelineBuilder::from_specs(PIPELINE_NAME, specs)
    }
}
