//! Step-by-step execution traces.
//!
//! [`Pipeline::debug`](crate::compose::Pipeline::debug) replays one observation
//! with `predict` semantics and records the observation after every node.
//! The trace is plain data: it serializes for external renderers and has a
//! text rendering through `Display`.

use crate::compose::node::NodeKind;
use crate::error::MergeCollision;
use crate::observation::{Observation, Value};
use crate::traits::Contribution;
use serde::Serialize;
use std::fmt;

/// Snapshot of the observation right after one node ran.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TraceEntry {
    /// Node name.
    pub label: String,
    pub kind: NodeKind,
    /// Nesting depth; union branches and nested pipeline steps sit one level
    /// below their parent.
    pub depth: usize,
    /// Ordinal position within the parent.
    pub position: usize,
    pub observation: Observation,
    /// Merge collisions, for union entries.
    pub collisions: Vec<MergeCollision>,
}

/// What the terminal node produced during the trace.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceOutcome {
    /// The pipeline has no predictor at the end.
    None,
    Prediction {
        node: String,
        prediction: Value,
    },
    Breakdown {
        node: String,
        prediction: Value,
        contributions: Vec<Contribution>,
    },
}

/// The full record of one debug pass.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Trace {
    pub input: Observation,
    pub entries: Vec<TraceEntry>,
    pub outcome: TraceOutcome,
}

impl Trace {
    /// First entry with the given label.
    pub fn entry(&self, label: &str) -> Option<&TraceEntry> {
        self.entries.iter().find(|e| e.label == label)
    }

    pub fn prediction(&self) -> Option<&Value> {
        match &self.outcome {
            TraceOutcome::None => None,
            TraceOutcome::Prediction { prediction, .. }
            | TraceOutcome::Breakdown { prediction, .. } => Some(prediction),
        }
    }

    pub fn contributions(&self) -> Option<&[Contribution]> {
        match &self.outcome {
            TraceOutcome::Breakdown { contributions, .. } => Some(contributions),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn write_header(f: &mut fmt::Formatter<'_>, indent: &str, title: &str) -> fmt::Result {
    writeln!(f, "{indent}{title}")?;
    writeln!(f, "{indent}{}", "-".repeat(title.chars().count()))
}

fn write_observation(
    f: &mut fmt::Formatter<'_>,
    indent: &str,
    x: &Observation,
    precision: usize,
) -> fmt::Result {
    if x.is_empty() {
        return writeln!(f, "{indent}(empty)");
    }
    for (key, value) in x {
        writeln!(f, "{indent}{key}: {:.*}", precision, value)?;
    }
    Ok(())
}

fn write_contributions(
    f: &mut fmt::Formatter<'_>,
    rows: &[Contribution],
    precision: usize,
) -> fmt::Result {
    let name_width = rows
        .iter()
        .map(|r| r.feature.chars().count())
        .chain(std::iter::once("Name".len()))
        .max()
        .unwrap_or(4);
    let cells: Vec<[String; 3]> = rows
        .iter()
        .map(|r| {
            [
                format!("{:.*}", precision, r.value),
                format!("{:.*}", precision, r.weight),
                format!("{:.*}", precision, r.contribution),
            ]
        })
        .collect();
    let width = cells
        .iter()
        .flat_map(|c| c.iter().map(String::len))
        .chain(std::iter::once("Contribution".len()))
        .max()
        .unwrap_or(12);

    writeln!(
        f,
        "{:<name_width$}  {:>width$}  {:>width$}  {:>width$}",
        "Name", "Value", "Weight", "Contribution"
    )?;
    for (row, [value, weight, contribution]) in rows.iter().zip(&cells) {
        writeln!(
            f,
            "{:<name_width$}  {:>width$}  {:>width$}  {:>width$}",
            row.feature, value, weight, contribution
        )?;
    }
    Ok(())
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let precision = f.precision().unwrap_or(4);

        write_header(f, "", "0. Input")?;
        write_observation(f, "", &self.input, precision)?;

        // Hierarchical numbering: 1, 2, 2.1, 2.2, 3 ...
        let mut counters: Vec<usize> = Vec::new();
        for entry in &self.entries {
            counters.truncate(entry.depth + 1);
            while counters.len() <= entry.depth {
                counters.push(0);
            }
            counters[entry.depth] += 1;
            let number = counters
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(".");

            let indent = "  ".repeat(entry.depth);
            writeln!(f)?;
            write_header(f, &indent, &format!("{number}. {}", entry.label))?;
            write_observation(f, &indent, &entry.observation, precision)?;
            for collision in &entry.collisions {
                writeln!(f, "{indent}! collision: {collision}")?;
            }
        }

        let next = counters.first().copied().unwrap_or(0) + 1;
        match &self.outcome {
            TraceOutcome::None => Ok(()),
            TraceOutcome::Prediction { node, prediction } => {
                writeln!(f)?;
                write_header(f, "", &format!("{next}. {node}"))?;
                writeln!(f, "Prediction: {:.*}", precision, prediction)
            }
            TraceOutcome::Breakdown {
                node,
                prediction,
                contributions,
            } => {
                writeln!(f)?;
                write_header(f, "", &format!("{next}. {node}"))?;
                write_contributions(f, contributions, precision)?;
                writeln!(f)?;
                writeln!(f, "Prediction: {:.*}", precision, prediction)
            }
        }
    }
}

/// Collects trace entries during a debug pass.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    entries: Vec<TraceEntry>,
}

impl Recorder {
    pub(crate) fn into_entries(self) -> Vec<TraceEntry> {
        self.entries
    }
}

/// Per-call execution context threaded through the node tree.
pub(crate) struct Pass<'a> {
    /// Whether transformers absorb the observations they see.
    pub(crate) update: bool,
    recorder: Option<&'a mut Recorder>,
}

impl<'a> Pass<'a> {
    pub(crate) fn new(update: bool) -> Self {
        Self {
            update,
            recorder: None,
        }
    }

    pub(crate) fn recording(recorder: &'a mut Recorder) -> Self {
        Self {
            update: true,
            recorder: Some(recorder),
        }
    }

    /// Append a completed entry. Returns its index, if recording.
    pub(crate) fn record(
        &mut self,
        label: &str,
        kind: NodeKind,
        depth: usize,
        position: usize,
        observation: &Observation,
    ) -> Option<usize> {
        let recorder = self.recorder.as_deref_mut()?;
        recorder.entries.push(TraceEntry {
            label: label.to_string(),
            kind,
            depth,
            position,
            observation: observation.clone(),
            collisions: Vec::new(),
        });
        Some(recorder.entries.len() - 1)
    }

    /// Reserve a slot for a composite node so that it precedes its children.
    pub(crate) fn reserve(
        &mut self,
        label: &str,
        kind: NodeKind,
        depth: usize,
        position: usize,
    ) -> Option<usize> {
        self.record(label, kind, depth, position, &Observation::new())
    }

    /// Fill a reserved slot once the composite has produced its output.
    pub(crate) fn fill(
        &mut self,
        slot: Option<usize>,
        observation: &Observation,
        collisions: &[MergeCollision],
    ) {
        if let (Some(index), Some(recorder)) = (slot, self.recorder.as_deref_mut()) {
            let entry = &mut recorder.entries[index];
            entry.observation = observation.clone();
            entry.collisions = collisions.to_vec();
        }
    }
}
