//! Tail command implementation.

use crate::error::CliError;
use std::collections::HashMap;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tidewal_core::{Watcher, WatcherOptions, WriteTo};
use tidewal_record::{RefSample, RefSeries};

/// Prints samples with the labels of their series.
#[derive(Default)]
struct PrintSink {
    /// Rendered label set and the segment it was last seen in.
    series: HashMap<u64, (String, u64)>,
}

impl WriteTo for PrintSink {
    fn append(&mut self, samples: &[RefSample]) -> bool {
        for s in samples {
            let labels = self
                .series
                .get(&s.series_ref)
                .map_or("<unknown>", |(labels, _)| labels.as_str());
            println!("{labels} t={} v={}", s.t, s.v);
        }
        true
    }

    fn store_series(&mut self, series: &[RefSeries], segment: u64) {
        for s in series {
            self.series
                .insert(s.series_ref, (render_labels(s), segment));
        }
    }

    fn series_reset(&mut self, checkpoint_index: u64) {
        self.series
            .retain(|_, (_, segment)| *segment >= checkpoint_index);
    }
}

fn render_labels(series: &RefSeries) -> String {
    let labels: Vec<String> = series
        .labels
        .iter()
        .map(|l| format!("{}={:?}", l.name, l.value))
        .collect();
    format!("{{{}}}", labels.join(", "))
}

/// Runs the tail command until the duration elapses, or forever.
pub fn run(path: &Path, duration_secs: Option<u64>) -> Result<(), CliError> {
    let options = WatcherOptions::new("cli", path);
    let handle = Watcher::new(options, Box::new(PrintSink::default())).start()?;

    match duration_secs {
        Some(secs) => {
            thread::sleep(Duration::from_secs(secs));
            handle.stop();
        }
        None => loop {
            thread::park();
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_reset_keeps_newer_series() {
        let mut sink = PrintSink::default();
        sink.store_series(&[RefSeries::new(1, [("job", "old")])], 0);
        sink.store_series(&[RefSeries::new(2, [("job", "new")])], 3);
        sink.series_reset(2);

        assert!(!sink.series.contains_key(&1));
        assert_eq!(sink.series[&2].0, "{job=\"new\"}");
        assert!(sink.append(&[RefSample::new(9, 1, 1.0)]));
    }
}
