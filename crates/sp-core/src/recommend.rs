//! Rebalancing recommendations.
//!
//! Consumes a [`WorkloadAnalysis`] and proposes moving work from critical
//! and overloaded contributors to underutilized ones. Matching is a scored
//! candidate set rather than nested conditionals: for each overloaded
//! contributor, the underutilized contributors sharing a required profile
//! are generated, scored by a [`CandidateScorer`], and the best one is
//! paired. Every recommendation is then given a priority by a
//! [`PriorityScorer`].
//!
//! | Situation                                   | Kind                  | Severity |
//! |---------------------------------------------|-----------------------|----------|
//! | critical, candidate found                   | `rebalance-overload`  | critical |
//! | overloaded, candidate found                 | `rebalance-overload`  | high     |
//! | critical, no candidate                      | `critical-attention`  | critical |
//! | overloaded, no candidate                    | `reduce-workload`     | high     |
//! | underutilized, not picked as a target       | `staff-underutilized` | low..high |
//!
//! A rebalance names the project to move: the overloaded contributor's most
//! heavily booked project in the window that the target's shared profiles
//! can cover. A staffing recommendation names the active project with the
//! most open work requiring one of the contributor's profiles.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::WorkingTime;
use crate::error::EngineError;
use crate::model::ProjectTask;
use crate::query::{MetricStore, ProjectSource, StaffingSource};
use crate::types::{ContributorId, ProfileId, ProjectId};
use crate::workload::{
    WorkloadAnalysis, WorkloadBounds, WorkloadClassification, WorkloadClassifier, WorkloadStatus,
};

/// What a recommendation asks the caller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendationKind {
    RebalanceOverload,
    ReduceWorkload,
    CriticalAttention,
    StaffUnderutilized,
}

impl RecommendationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RebalanceOverload => "rebalance-overload",
            Self::ReduceWorkload => "reduce-workload",
            Self::CriticalAttention => "critical-attention",
            Self::StaffUnderutilized => "staff-underutilized",
        }
    }
}

impl fmt::Display for RecommendationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Urgency of a recommendation, ordered from `Low` to `Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Zero-based rank: low = 0, critical = 3.
    pub const fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An actionable suggestion returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub severity: SeverityLevel,
    pub priority_score: f64,
    pub title: String,
    pub description: String,
    pub contributor: ContributorId,
    /// Underutilized contributor receiving work, for rebalances.
    pub target: Option<ContributorId>,
    /// Project whose work moves (rebalances) or that could use the
    /// contributor (staffing).
    pub project: Option<ProjectId>,
    pub expected_impact: String,
    pub reasoning: String,
}

/// Maps severity and magnitude to a priority score.
///
/// Implementations must keep every score of a higher severity above every
/// score of a lower one, and be increasing in magnitude within a level.
pub trait PriorityScorer {
    fn score(&self, severity: SeverityLevel, magnitude: f64) -> f64;
}

/// `100 × rank(severity) + 100 × (1 − e^(−magnitude / 50))`.
///
/// The magnitude term lies in `[0, 100)`, so severity dominates.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeverityWeightedScorer;

impl PriorityScorer for SeverityWeightedScorer {
    fn score(&self, severity: SeverityLevel, magnitude: f64) -> f64 {
        let magnitude = if magnitude.is_finite() { magnitude.max(0.0) } else { 0.0 };
        100.0f64.mul_add(
            f64::from(severity.rank()),
            100.0 * (1.0 - (-magnitude / 50.0).exp()),
        )
    }
}

/// Scores an underutilized candidate for taking over work.
///
/// Higher is better. Only candidates sharing at least one profile are
/// ever scored.
pub trait CandidateScorer {
    fn score(
        &self,
        overloaded: &WorkloadClassification,
        candidate: &WorkloadClassification,
        shared_profiles: usize,
        bounds: &WorkloadBounds,
    ) -> f64;
}

/// Prefers the candidate with the most headroom below the underutilized
/// bound, then the one sharing more profiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadroomScorer;

impl CandidateScorer for HeadroomScorer {
    fn score(
        &self,
        _overloaded: &WorkloadClassification,
        candidate: &WorkloadClassification,
        shared_profiles: usize,
        bounds: &WorkloadBounds,
    ) -> f64 {
        let headroom = (bounds.underutilized - candidate.tace).max(0.0);
        #[expect(clippy::cast_precision_loss, reason = "profile counts are small")]
        let shared = shared_profiles as f64;
        10.0f64.mul_add(shared, headroom)
    }
}

/// Tunables for the recommender.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderConfig {
    /// Gap below the underutilized bound still considered minor. Default: 10.
    pub minor_gap: f64,
    /// TACE below which underutilization is severe. Default: 50.
    pub severe_underutilization: f64,
    /// Overloaded contributors looked up per chunk. Default: 50.
    pub batch_size: usize,
    /// Calendar used to total booked hours per project.
    pub working_time: WorkingTime,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            minor_gap: 10.0,
            severe_underutilization: 50.0,
            batch_size: crate::metrics::DEFAULT_BATCH_SIZE,
            working_time: WorkingTime::default(),
        }
    }
}

/// Counts over a recommendation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecommendationSummary {
    pub total_recommendations: usize,
    /// High and critical severity.
    pub high_priority_count: usize,
    pub medium_priority_count: usize,
    pub low_priority_count: usize,
    pub contributors_analyzed: usize,
    pub critical_workload_count: usize,
}

/// Recommendations sorted by priority, plus their summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecommendationReport {
    pub recommendations: Vec<Recommendation>,
    pub summary: RecommendationSummary,
}

/// Produces prioritized rebalancing recommendations.
#[derive(Debug, Clone)]
pub struct RebalancingRecommender<P = SeverityWeightedScorer, C = HeadroomScorer> {
    classifier: WorkloadClassifier,
    config: RecommenderConfig,
    priority: P,
    candidates: C,
}

impl RebalancingRecommender {
    pub const fn new(classifier: WorkloadClassifier, config: RecommenderConfig) -> Self {
        Self {
            classifier,
            config,
            priority: SeverityWeightedScorer,
            candidates: HeadroomScorer,
        }
    }
}

impl Default for RebalancingRecommender {
    fn default() -> Self {
        Self::new(WorkloadClassifier::default(), RecommenderConfig::default())
    }
}

impl<P: PriorityScorer, C: CandidateScorer> RebalancingRecommender<P, C> {
    /// Replaces the scoring functions.
    pub fn with_scorers<P2: PriorityScorer, C2: CandidateScorer>(
        self,
        priority: P2,
        candidates: C2,
    ) -> RebalancingRecommender<P2, C2> {
        RebalancingRecommender {
            classifier: self.classifier,
            config: self.config,
            priority,
            candidates,
        }
    }

    /// Classifies contributors over `[start, end]` and recommends from the
    /// result.
    pub fn generate_recommendations<S>(
        &self,
        source: &S,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RecommendationReport, EngineError>
    where
        S: StaffingSource + MetricStore + ProjectSource,
    {
        let analysis = self.classifier.analyze_all_contributors(source, start, end)?;
        self.recommend(source, &analysis, start, end)
    }

    /// Recommends from an existing analysis.
    ///
    /// Profiles come from employment terms overlapping `[start, end]` and
    /// from tasks currently assigned to each overloaded contributor. Each
    /// underutilized contributor is picked as a target at most once.
    pub fn recommend<S>(
        &self,
        source: &S,
        analysis: &WorkloadAnalysis,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RecommendationReport, EngineError>
    where
        S: StaffingSource + ProjectSource,
    {
        let bounds = *self.classifier.thresholds().bounds();

        let mut candidate_profiles: HashMap<&ContributorId, BTreeSet<ProfileId>> = HashMap::new();
        for candidate in &analysis.underutilized {
            let profiles = term_profiles(source, &candidate.contributor.id, start, end)?;
            candidate_profiles.insert(&candidate.contributor.id, profiles);
        }

        let overloaded: Vec<&WorkloadClassification> =
            analysis.critical.iter().chain(&analysis.overloaded).collect();
        let mut taken: HashSet<&ContributorId> = HashSet::new();
        let mut recommendations = Vec::new();

        for (chunk_index, chunk) in overloaded.chunks(self.config.batch_size.max(1)).enumerate() {
            tracing::debug!(chunk = chunk_index, size = chunk.len(), "matching overloaded contributors");
            for &over in chunk {
                let assigned = source.tasks_assigned_to(&over.contributor.id)?;
                let required = required_profiles(source, &assigned, &over.contributor.id, start, end)?;
                let best = analysis
                    .underutilized
                    .iter()
                    .filter(|c| !taken.contains(&c.contributor.id))
                    .filter_map(|candidate| {
                        let shared: BTreeSet<ProfileId> = candidate_profiles
                            .get(&candidate.contributor.id)?
                            .intersection(&required)
                            .cloned()
                            .collect();
                        (!shared.is_empty()).then(|| {
                            let score =
                                self.candidates.score(over, candidate, shared.len(), &bounds);
                            (candidate, shared, score)
                        })
                    })
                    .max_by(|a, b| {
                        a.2.total_cmp(&b.2)
                            .then_with(|| b.0.contributor.id.cmp(&a.0.contributor.id))
                    });

                let recommendation = match best {
                    Some((target, shared, _)) => {
                        taken.insert(&target.contributor.id);
                        let project = self.project_to_move(
                            source,
                            &over.contributor.id,
                            &assigned,
                            &shared,
                            start,
                            end,
                        )?;
                        self.rebalance(over, target, shared.len(), project, &bounds)
                    }
                    None => self.without_target(over, &bounds, required.is_empty()),
                };
                recommendations.push(recommendation);
            }
        }

        let idle: Vec<&WorkloadClassification> = analysis
            .underutilized
            .iter()
            .filter(|under| !taken.contains(&under.contributor.id))
            .collect();
        let open = if idle.is_empty() {
            Vec::new()
        } else {
            open_work(source)?
        };
        for under in idle {
            let project = candidate_profiles
                .get(&under.contributor.id)
                .and_then(|profiles| matching_project(&open, profiles))
                .map(|work| (work.id.clone(), work.name.clone()));
            recommendations.push(self.staff_underutilized(under, project, &bounds));
        }

        recommendations.sort_by(|a, b| {
            b.priority_score
                .total_cmp(&a.priority_score)
                .then_with(|| a.contributor.cmp(&b.contributor))
                .then_with(|| a.kind.cmp(&b.kind))
        });

        let summary = summarize(&recommendations, analysis);
        tracing::debug!(
            total = summary.total_recommendations,
            high = summary.high_priority_count,
            medium = summary.medium_priority_count,
            low = summary.low_priority_count,
            "recommendations generated"
        );
        Ok(RecommendationReport {
            recommendations,
            summary,
        })
    }

    /// Picks the overloaded contributor's most heavily booked project whose
    /// assigned tasks the target can cover, falling back to a project of an
    /// assigned task requiring a shared profile.
    fn project_to_move<S: StaffingSource + ProjectSource>(
        &self,
        source: &S,
        contributor: &ContributorId,
        assigned: &[ProjectTask],
        shared: &BTreeSet<ProfileId>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<(ProjectId, String)>, EngineError> {
        let mut task_profiles: BTreeMap<&ProjectId, BTreeSet<&ProfileId>> = BTreeMap::new();
        for task in assigned {
            if let Some(profile) = &task.required_profile {
                task_profiles
                    .entry(&task.project_id)
                    .or_default()
                    .insert(profile);
            }
        }
        let coverable = |project: &ProjectId| {
            task_profiles
                .get(project)
                .is_none_or(|required| required.iter().any(|p| shared.contains(*p)))
        };

        let wt = &self.config.working_time;
        let mut booked: BTreeMap<ProjectId, f64> = BTreeMap::new();
        for alloc in source.planned_allocations(contributor, start, end)? {
            let (from, to) = (alloc.start_date.max(start), alloc.end_date.min(end));
            let hours: f64 = from
                .iter_days()
                .take_while(|day| *day <= to)
                .map(|day| alloc.booked_hours_on(day, wt))
                .sum();
            if hours > 0.0 {
                *booked.entry(alloc.project_id).or_insert(0.0) += hours;
            }
        }

        let heaviest = booked
            .iter()
            .filter(|(id, _)| coverable(*id))
            .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(id, _)| id.clone());
        let chosen = heaviest.or_else(|| {
            task_profiles
                .iter()
                .find(|(_, required)| required.iter().any(|p| shared.contains(*p)))
                .map(|(id, _)| (*id).clone())
        });
        let Some(id) = chosen else {
            return Ok(None);
        };
        let name = source
            .project(&id)?
            .map_or_else(|| id.to_string(), |project| project.name);
        Ok(Some((id, name)))
    }

    fn rebalance(
        &self,
        over: &WorkloadClassification,
        target: &WorkloadClassification,
        shared: usize,
        project: Option<(ProjectId, String)>,
        bounds: &WorkloadBounds,
    ) -> Recommendation {
        let severity = overload_severity(over.status);
        let magnitude = over.tace - bounds.overloaded;
        let ideal = bounds.ideal();
        let transfer = (over.tace - ideal).min(ideal - target.tace).max(0.0);
        let (project, title) = match project {
            Some((id, name)) => (
                Some(id),
                format!(
                    "Move {name} work from {} to {}",
                    over.contributor.name, target.contributor.name
                ),
            ),
            None => (
                None,
                format!(
                    "Move work from {} to {}",
                    over.contributor.name, target.contributor.name
                ),
            ),
        };
        Recommendation {
            kind: RecommendationKind::RebalanceOverload,
            severity,
            priority_score: self.priority.score(severity, magnitude),
            title,
            description: format!(
                "{} is {} at {:.2}% TACE while {} has capacity at {:.2}%.",
                over.contributor.name, over.status, over.tace, target.contributor.name, target.tace
            ),
            contributor: over.contributor.id.clone(),
            target: Some(target.contributor.id.clone()),
            project,
            expected_impact: format!(
                "Shifting about {transfer:.0} TACE points brings both contributors closer to {ideal:.0}%."
            ),
            reasoning: format!(
                "{} exceeds the overloaded bound ({:.0}%) by {magnitude:.2} points; {} shares {shared} required profile(s).",
                over.contributor.name, bounds.overloaded, target.contributor.name
            ),
        }
    }

    fn without_target(
        &self,
        over: &WorkloadClassification,
        bounds: &WorkloadBounds,
        no_profiles: bool,
    ) -> Recommendation {
        let severity = overload_severity(over.status);
        let magnitude = over.tace - bounds.overloaded;
        let why = if no_profiles {
            "no required profile is known for their current work"
        } else {
            "no underutilized contributor shares a required profile"
        };
        let (kind, title, impact) = if over.status == WorkloadStatus::Critical {
            (
                RecommendationKind::CriticalAttention,
                format!("{} needs immediate attention", over.contributor.name),
                "Prevents burnout and delivery slippage on current assignments.".to_string(),
            )
        } else {
            (
                RecommendationKind::ReduceWorkload,
                format!("Reduce workload for {}", over.contributor.name),
                format!("Brings TACE back under {:.0}%.", bounds.overloaded),
            )
        };
        Recommendation {
            kind,
            severity,
            priority_score: self.priority.score(severity, magnitude),
            title,
            description: format!(
                "{} is {} at {:.2}% TACE.",
                over.contributor.name, over.status, over.tace
            ),
            contributor: over.contributor.id.clone(),
            target: None,
            project: None,
            expected_impact: impact,
            reasoning: format!(
                "Exceeds the overloaded bound ({:.0}%) by {magnitude:.2} points and {why}.",
                bounds.overloaded
            ),
        }
    }

    fn staff_underutilized(
        &self,
        under: &WorkloadClassification,
        project: Option<(ProjectId, String)>,
        bounds: &WorkloadBounds,
    ) -> Recommendation {
        let gap = bounds.underutilized - under.tace;
        let severity = if gap < self.config.minor_gap {
            SeverityLevel::Low
        } else if under.tace < self.config.severe_underutilization {
            SeverityLevel::High
        } else {
            SeverityLevel::Medium
        };
        let (project, title) = match project {
            Some((id, name)) => (Some(id), format!("Staff {} on {name}", under.contributor.name)),
            None => (None, format!("Staff {} on more work", under.contributor.name)),
        };
        Recommendation {
            kind: RecommendationKind::StaffUnderutilized,
            severity,
            priority_score: self.priority.score(severity, gap),
            title,
            description: format!(
                "{} is underutilized at {:.2}% TACE.",
                under.contributor.name, under.tace
            ),
            contributor: under.contributor.id.clone(),
            target: None,
            project,
            expected_impact: format!(
                "Up to {gap:.0} TACE points of capacity become billable."
            ),
            reasoning: format!(
                "{gap:.2} points below the underutilized bound ({:.0}%) and no overloaded contributor needs their profiles.",
                bounds.underutilized
            ),
        }
    }
}

const fn overload_severity(status: WorkloadStatus) -> SeverityLevel {
    match status {
        WorkloadStatus::Critical => SeverityLevel::Critical,
        _ => SeverityLevel::High,
    }
}

fn term_profiles<S: StaffingSource>(
    source: &S,
    contributor: &ContributorId,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<BTreeSet<ProfileId>, EngineError> {
    Ok(source
        .employment_terms(contributor)?
        .into_iter()
        .filter(|term| term.overlaps(start, end))
        .flat_map(|term| term.profiles)
        .collect())
}

/// Profiles needed by the contributor's current tasks, or their own term
/// profiles when no task names one.
fn required_profiles<S: StaffingSource>(
    source: &S,
    assigned: &[ProjectTask],
    contributor: &ContributorId,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<BTreeSet<ProfileId>, EngineError> {
    let from_tasks: BTreeSet<ProfileId> = assigned
        .iter()
        .filter_map(|task| task.required_profile.clone())
        .collect();
    if !from_tasks.is_empty() {
        return Ok(from_tasks);
    }
    term_profiles(source, contributor, start, end)
}

/// Remaining open hours of an active project, by required profile.
struct OpenWork {
    id: ProjectId,
    name: String,
    hours_by_profile: BTreeMap<ProfileId, f64>,
}

fn open_work<S: ProjectSource>(source: &S) -> Result<Vec<OpenWork>, EngineError> {
    let mut open = Vec::new();
    for project in source.active_projects()? {
        let mut hours_by_profile: BTreeMap<ProfileId, f64> = BTreeMap::new();
        for task in source.project_tasks(&project.id)? {
            if !task.needs_assignment() {
                continue;
            }
            let remaining = task.remaining_hours();
            if remaining <= 0.0 {
                continue;
            }
            if let Some(profile) = task.required_profile {
                *hours_by_profile.entry(profile).or_insert(0.0) += remaining;
            }
        }
        if !hours_by_profile.is_empty() {
            open.push(OpenWork {
                id: project.id,
                name: project.name,
                hours_by_profile,
            });
        }
    }
    Ok(open)
}

/// The project with the most open hours for `profiles`; ties go to the lower ID.
fn matching_project<'a>(open: &'a [OpenWork], profiles: &BTreeSet<ProfileId>) -> Option<&'a OpenWork> {
    open.iter()
        .filter_map(|work| {
            let hours: f64 = work
                .hours_by_profile
                .iter()
                .filter(|(profile, _)| profiles.contains(*profile))
                .map(|(_, hours)| hours)
                .sum();
            (hours > 0.0).then_some((work, hours))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.id.cmp(&a.0.id)))
        .map(|(work, _)| work)
}

fn summarize(recommendations: &[Recommendation], analysis: &WorkloadAnalysis) -> RecommendationSummary {
    let count = |levels: &[SeverityLevel]| {
        recommendations
            .iter()
            .filter(|r| levels.contains(&r.severity))
            .count()
    };
    RecommendationSummary {
        total_recommendations: recommendations.len(),
        high_priority_count: count(&[SeverityLevel::High, SeverityLevel::Critical]),
        medium_priority_count: count(&[SeverityLevel::Medium]),
        low_priority_count: count(&[SeverityLevel::Low]),
        contributors_analyzed: analysis.total(),
        critical_workload_count: analysis.critical.len(),
    }
}
