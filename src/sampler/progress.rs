//! Progress notifications for sampling runs.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

/// Receives coarse progress from one or more concurrent runs.
pub trait Progress: Send + Sync {
    /// A run against `address` is about to sample `target` keys.
    fn started(&self, _address: &str, _target: usize) {}

    /// `sampled` keys have been taken from `address` so far.
    fn sampled(&self, address: &str, sampled: usize, target: usize);

    /// The run against `address` completed successfully.
    fn finished(&self, _address: &str, _sampled: usize) {}

    /// The run against `address` stopped early with an error.
    fn failed(&self, _address: &str, _sampled: usize) {}
}

/// Reports progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn started(&self, address: &str, target: usize) {
        info!("Sampling {} keys from {}...", target, address);
    }

    fn sampled(&self, address: &str, sampled: usize, target: usize) {
        info!("Sampled {}/{} keys from {}...", sampled, target, address);
    }

    fn finished(&self, address: &str, sampled: usize) {
        info!("Finished sampling {} keys from {}", sampled, address);
    }
}

/// Discards all notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Progress for Silent {
    fn sampled(&self, _address: &str, _sampled: usize, _target: usize) {}
}

/// One progress bar per instance.
pub struct BarProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:<22} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} keys {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
    }

    fn with_bar(&self, address: &str, f: impl FnOnce(&ProgressBar)) {
        if let Ok(bars) = self.bars.lock() {
            if let Some(bar) = bars.get(address) {
                f(bar);
            }
        }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for BarProgress {
    fn started(&self, address: &str, target: usize) {
        let bar = self.multi.add(ProgressBar::new(target as u64));
        bar.set_style(Self::style());
        bar.set_prefix(address.to_string());
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(address.to_string(), bar);
        }
    }

    fn sampled(&self, address: &str, sampled: usize, _target: usize) {
        self.with_bar(address, |bar| bar.set_position(sampled as u64));
    }

    fn finished(&self, address: &str, sampled: usize) {
        self.with_bar(address, |bar| {
            bar.set_position(sampled as u64);
            bar.finish();
        });
    }

    fn failed(&self, address: &str, sampled: usize) {
        self.with_bar(address, |bar| {
            bar.set_position(sampled as u64);
            bar.abandon_with_message("failed");
        });
    }
}
