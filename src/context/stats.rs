//! Per-frame command statistics.

/// Draws recorded into one render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassStats {
    pub label: String,
    pub draws: usize,
}

/// What the context issued between two `begin_frame` calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub passes: Vec<PassStats>,
    pub copies: usize,
    pub submits: usize,
}

impl FrameStats {
    pub(crate) fn begin_pass(&mut self, label: &str) {
        self.passes.push(PassStats {
            label: label.to_string(),
            draws: 0,
        });
    }

    pub(crate) fn record_draw(&mut self) {
        if let Some(pass) = self.passes.last_mut() {
            pass.draws += 1;
        }
    }

    /// Total draws across all passes with the given label.
    pub fn draws_in(&self, label: &str) -> usize {
        self.passes
            .iter()
            .filter(|pass| pass.label == label)
            .map(|pass| pass.draws)
            .sum()
    }

    pub fn passes_labeled(&self, label: &str) -> usize {
        self.passes.iter().filter(|pass| pass.label == label).count()
    }

    pub fn total_draws(&self) -> usize {
        self.passes.iter().map(|pass| pass.draws).sum()
    }
}
