//! Step grid: instrument id -> fixed-length on/off sequence

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawStepGrid")]
pub struct StepGrid {
    step_count: usize,
    steps: BTreeMap<String, Vec<bool>>,
}

/// Wire shape of a grid before lanes are normalized to `step_count`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStepGrid {
    step_count: usize,
    #[serde(default)]
    steps: BTreeMap<String, Vec<bool>>,
}

impl From<RawStepGrid> for StepGrid {
    fn from(raw: RawStepGrid) -> Self {
        Self::from_lanes(raw.step_count, raw.steps)
    }
}

impl StepGrid {
    pub fn new(step_count: usize) -> Self {
        Self {
            step_count: step_count.max(1),
            steps: BTreeMap::new(),
        }
    }

    /// Build from per-instrument sequences; lanes are padded or cut to `step_count`.
    pub fn from_lanes(step_count: usize, lanes: BTreeMap<String, Vec<bool>>) -> Self {
        let mut grid = Self {
            step_count: step_count.max(1),
            steps: lanes,
        };
        grid.resize(grid.step_count);
        grid
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Flip one step. Returns the new value, or `None` if `step` is out of range.
    pub fn toggle(&mut self, instrument_id: &str, step: usize) -> Option<bool> {
        if step >= self.step_count {
            return None;
        }
        let cell = self.lane_mut(instrument_id).get_mut(step)?;
        *cell = !*cell;
        Some(*cell)
    }

    /// Returns false if `step` is out of range.
    pub fn set(&mut self, instrument_id: &str, step: usize, active: bool) -> bool {
        if step >= self.step_count {
            return false;
        }
        match self.lane_mut(instrument_id).get_mut(step) {
            Some(cell) => {
                *cell = active;
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, instrument_id: &str, step: usize) -> bool {
        self.steps
            .get(instrument_id)
            .and_then(|lane| lane.get(step))
            .copied()
            .unwrap_or(false)
    }

    /// Instruments that fire on `step`, in instrument-id order.
    pub fn active_at(&self, step: usize) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|(_, lane)| lane.get(step).copied().unwrap_or(false))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn lane(&self, instrument_id: &str) -> Option<&[bool]> {
        self.steps.get(instrument_id).map(Vec::as_slice)
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    pub fn clear_lane(&mut self, instrument_id: &str) {
        self.steps.remove(instrument_id);
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    /// Change the grid length. New steps are off.
    pub fn resize(&mut self, step_count: usize) {
        self.step_count = step_count.max(1);
        for lane in self.steps.values_mut() {
            lane.resize(self.step_count, false);
        }
    }

    fn lane_mut(&mut self, instrument_id: &str) -> &mut Vec<bool> {
        let step_count = self.step_count;
        let lane = self
            .steps
            .entry(instrument_id.to_string())
            .or_insert_with(|| vec![false; step_count]);
        lane.resize(step_count, false);
        lane
    }
}

impl Default for StepGrid {
    fn default() -> Self {
        Self::new(16)
    }
}
