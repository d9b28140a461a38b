//! Parsing of git's `--progress` stderr sub-protocol.
//!
//! Network operations report heterogeneous phases (compressing, receiving,
//! resolving, ...), each with its own 0-100% counter. A
//! [`StepProgressParser`] normalizes them into one monotonic percent by
//! giving every phase a disjoint sub-range of `[0, 1]` sized by its
//! expected share of the work, and interpolating the phase's own
//! percentage within that range.

use std::sync::LazyLock;

use regex::Regex;

/// One phase of a multi-phase git operation.
#[derive(Debug, Clone, Copy)]
pub struct ProgressStep {
    /// The line prefix git uses for this phase, e.g. `Receiving objects`.
    pub title: &'static str,

    /// This phase's share of the overall operation. Weights across one
    /// parser's steps must sum to 1.
    pub weight: f64,
}

/// Details of one parsed progress line.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProgressDetails {
    /// The phase title.
    pub title: String,

    /// The full line as git printed it, trimmed.
    pub text: String,

    /// Units completed within the phase.
    pub value: u64,

    /// Total units in the phase.
    pub total: u64,
}

/// One line of the progress sub-protocol.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum GitProgress {
    /// A free-text line that is not a progress counter.
    Context { text: String },

    /// A progress counter, with the overall percent already normalized
    /// across phases.
    Step {
        /// Overall percent in `[0, 1]`, non-decreasing within one
        /// operation's stream.
        percent: f64,
        details: ProgressDetails,
    },
}

static PROGRESS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    // e.g. "Receiving objects:  79% (6350/8000), 5.2 MiB | 1.0 MiB/s"
    Regex::new(r"^(.+?):\s+(\d+)% \((\d+)/(\d+)\)(.*)$")
        .expect("constant progress pattern is valid")
});

/// Normalizes a fixed sequence of progress phases into one `[0, 1]` scale.
///
/// The step index only moves forward: once a later phase has reported,
/// stray lines from earlier phases are treated as context, which keeps the
/// emitted percent monotonic (barring an operation restart, which requires
/// a fresh parser).
pub struct StepProgressParser {
    steps: &'static [ProgressStep],
    current_step: usize,
    last_percent: f64,
}

impl StepProgressParser {
    pub fn new(steps: &'static [ProgressStep]) -> Self {
        debug_assert!(
            (steps.iter().map(|s| s.weight).sum::<f64>() - 1.0).abs() < 1e-6,
            "step weights must sum to 1"
        );
        Self {
            steps,
            current_step: 0,
            last_percent: 0.0,
        }
    }

    /// Parse one stderr line.
    pub fn parse(&mut self, line: &str) -> GitProgress {
        let trimmed = line.trim();

        if let Some(captures) = PROGRESS_LINE.captures(trimmed) {
            let title = &captures[1];
            if let Some(index) = self.find_step(title) {
                let percent_in_step: f64 = captures[2].parse().unwrap_or(0.0) / 100.0;
                let value: u64 = captures[3].parse().unwrap_or(0);
                let total: u64 = captures[4].parse().unwrap_or(0);

                self.current_step = index;
                let range_start: f64 = self.steps[..index].iter().map(|s| s.weight).sum();
                let percent = range_start + self.steps[index].weight * percent_in_step;
                // Clamp: a counter must never appear to move backwards.
                self.last_percent = self.last_percent.max(percent);

                return GitProgress::Step {
                    percent: self.last_percent,
                    details: ProgressDetails {
                        title: self.steps[index].title.to_string(),
                        text: trimmed.to_string(),
                        value,
                        total,
                    },
                };
            }
        }

        GitProgress::Context {
            text: trimmed.to_string(),
        }
    }

    /// The overall percent reported so far.
    pub fn percent(&self) -> f64 {
        self.last_percent
    }

    /// Find the step a line belongs to, looking only at the current step
    /// and later ones.
    fn find_step(&self, title: &str) -> Option<usize> {
        self.steps[self.current_step..]
            .iter()
            .position(|step| step.title == title)
            .map(|offset| self.current_step + offset)
    }
}

/// The context-line prefixes forwarded to transfer observers.
///
/// Stderr from network operations also carries ref-update chatter which
/// does not belong in the progress stream; context lines outside this
/// allow-list are suppressed rather than guessed at.
const CONTEXT_ALLOW_LIST: &[&str] = &["remote: Counting objects"];

/// Whether a context line may be forwarded to transfer observers.
pub(crate) fn is_forwardable_context(text: &str) -> bool {
    CONTEXT_ALLOW_LIST
        .iter()
        .any(|prefix| text.starts_with(prefix))
}

/// Which network operation a [`TransferProgress`] event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Pull,
    Fetch,
}

/// An operation-level progress update handed to the caller's callback.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TransferProgress {
    pub kind: TransferKind,

    /// Operation title, e.g. `Pulling origin`.
    pub title: String,

    /// The most recent progress or context line, empty for the synthetic
    /// initial event.
    pub description: String,

    /// Overall percent in `[0, 1]`.
    pub value: f64,

    /// The remote the operation targets.
    pub remote: String,
}

/// Phases of `git pull --progress`, in canonical order.
pub const PULL_STEPS: &[ProgressStep] = &[
    ProgressStep {
        title: "remote: Compressing objects",
        weight: 0.1,
    },
    ProgressStep {
        title: "Receiving objects",
        weight: 0.7,
    },
    ProgressStep {
        title: "Resolving deltas",
        weight: 0.15,
    },
    ProgressStep {
        title: "Checking out files",
        weight: 0.05,
    },
];

/// Phases of `git fetch --progress`, in canonical order.
pub const FETCH_STEPS: &[ProgressStep] = &[
    ProgressStep {
        title: "remote: Compressing objects",
        weight: 0.1,
    },
    ProgressStep {
        title: "Receiving objects",
        weight: 0.7,
    },
    ProgressStep {
        title: "Resolving deltas",
        weight: 0.2,
    },
];
