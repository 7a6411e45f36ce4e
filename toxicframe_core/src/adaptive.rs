//! Strategy composition: length searches first, then content searches at
//! the minimised length.
//!
//! A toxic sample is split into `pattern × repeats ‖ suffix`. The suffix and
//! the pattern are each minimised in length and then explored in content,
//! with every content climb seeded by the shortest toxic candidate its
//! length search produced. A content step only climbs from a confirmed
//! toxic seed.

use crate::context::RunContext;
use crate::corpus::PatternLayout;
use crate::error::SearchError;
use crate::hill_climb::{ClimbReport, MutationHillClimber};
use crate::length_search::{self, LengthOutcome};
use crate::mutator::{BitFlipMutator, Mutator, SampledSubstitutionMutator};
use crate::probe::ProbeRequest;
use crate::store::TestKey;
use crate::template::Template;

pub const SUFFIX_CONTENT_LABEL: &str = "suffix_content";
pub const PATTERN_CONTENT_LABEL: &str = "pattern_content";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptiveStep {
    SuffixLength,
    SuffixContent,
    PatternLength,
    PatternContent,
}

#[derive(Debug, Clone)]
pub struct AdaptivePlan {
    pub steps: Vec<AdaptiveStep>,
    pub pattern_len: usize,
    pub iterations: usize,
    pub samples_per_position: usize,
    pub bit_flips: bool,
    pub rng_seed: u64,
}

impl AdaptivePlan {
    pub fn all(pattern_len: usize) -> Self {
        Self {
            steps: vec![
                AdaptiveStep::SuffixLength,
                AdaptiveStep::SuffixContent,
                AdaptiveStep::PatternLength,
                AdaptiveStep::PatternContent,
            ],
            pattern_len,
            iterations: 50,
            samples_per_position: 10,
            bit_flips: false,
            rng_seed: 0,
        }
    }

    fn includes(&self, step: AdaptiveStep) -> bool {
        self.steps.contains(&step)
    }
}

#[derive(Debug, Clone)]
pub struct AdaptiveReport {
    pub layout: PatternLayout,
    pub suffix_length: Option<LengthOutcome>,
    pub suffix_variants: Option<ClimbReport>,
    pub pattern_length: Option<LengthOutcome>,
    pub pattern_variants: Option<ClimbReport>,
}

pub struct AdaptiveOrchestrator<'a> {
    ctx: &'a RunContext,
    plan: AdaptivePlan,
}

impl<'a> AdaptiveOrchestrator<'a> {
    pub fn new(ctx: &'a RunContext, plan: AdaptivePlan) -> Self {
        Self { ctx, plan }
    }

    pub fn run(&self, sample: &[u8]) -> Result<AdaptiveReport, SearchError> {
        let layout = PatternLayout::analyze(sample, self.plan.pattern_len)?;
        tracing::info!(
            pattern = %hex::encode(&layout.pattern),
            repeats = layout.repeats,
            suffix_len = layout.suffix.len(),
            "sample layout"
        );
        let mut report = AdaptiveReport {
            layout: layout.clone(),
            suffix_length: None,
            suffix_variants: None,
            pattern_length: None,
            pattern_variants: None,
        };

        if self.plan.includes(AdaptiveStep::SuffixLength) && !layout.suffix.is_empty() {
            report.suffix_length = length_search::suffix_length(self.ctx, &layout)?;
        }

        if self.plan.includes(AdaptiveStep::SuffixContent) && !layout.suffix.is_empty() {
            let template = Template::suffix_after(&layout.pattern, layout.repeats);
            let seed = match (&report.suffix_length, self.plan.includes(AdaptiveStep::SuffixLength)) {
                (Some(outcome), _) => Some(layout.suffix[..outcome.length].to_vec()),
                (None, true) => None,
                (None, false) => self.confirmed_seed(SUFFIX_CONTENT_LABEL, &template, &layout.suffix)?,
            };
            match seed {
                Some(seed) => {
                    report.suffix_variants = Some(self.climb(SUFFIX_CONTENT_LABEL, template, seed)?)
                }
                None => tracing::warn!("no confirmed toxic suffix; skipping suffix content search"),
            }
        }

        if self.plan.includes(AdaptiveStep::PatternLength) {
            report.pattern_length = length_search::pattern_length(self.ctx, &layout)?;
        }

        if self.plan.includes(AdaptiveStep::PatternContent) {
            let target = report
                .pattern_length
                .as_ref()
                .map_or(layout.pattern.len(), |o| o.length);
            let repeats = length_search::rescaled_repeats(&layout, target);
            let template = Template::pattern_before(repeats, &layout.suffix);
            let pattern = &layout.pattern[..target];
            let seed = match (&report.pattern_length, self.plan.includes(AdaptiveStep::PatternLength)) {
                (Some(_), _) => Some(pattern.to_vec()),
                (None, true) => None,
                (None, false) => self.confirmed_seed(PATTERN_CONTENT_LABEL, &template, pattern)?,
            };
            match seed {
                Some(seed) => {
                    report.pattern_variants = Some(self.climb(PATTERN_CONTENT_LABEL, template, seed)?)
                }
                None => tracing::warn!("no confirmed toxic pattern; skipping pattern content search"),
            }
        }

        Ok(report)
    }

    /// `part` if its rendering through `template` confirms as TOXIC.
    fn confirmed_seed(
        &self,
        label: &str,
        template: &Template,
        part: &[u8],
    ) -> Result<Option<Vec<u8>>, SearchError> {
        let candidate = template.render(part);
        let request = ProbeRequest::new(TestKey::pattern(label, &candidate), candidate)
            .describe(format!("seed={}", hex::encode(part)));
        let result = self.ctx.confirm(&request)?;
        tracing::info!(label, %result, "content seed");
        Ok(result.is_toxic().then(|| part.to_vec()))
    }

    fn climb(
        &self,
        label: &str,
        template: Template,
        seed: Vec<u8>,
    ) -> Result<ClimbReport, SearchError> {
        let mut mutators: Vec<Box<dyn Mutator>> = vec![Box::new(SampledSubstitutionMutator::new(
            self.plan.samples_per_position,
        ))];
        if self.plan.bit_flips {
            mutators.push(Box::new(BitFlipMutator));
        }
        tracing::info!(label, target_len = seed.len(), "content search");
        MutationHillClimber::new(self.ctx, label, template)
            .with_mutators(mutators)
            .with_seed(self.plan.rng_seed)
            .with_max_iterations(self.plan.iterations)
            .run(vec![seed])
    }
}
