/// Bounded sample windows feeding the telemetry plots
///
/// One fixed-capacity FIFO per channel. Pushing a frame fans the values out
/// to every window, so the windows stay in lockstep and the plot x-axis is
/// simply the sample index inside the window.

use crate::telemetry::ChannelSpec;
use std::collections::VecDeque;

/// Fixed-capacity FIFO over the most recent samples of one channel
#[derive(Debug, Clone)]
pub struct SeriesWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SeriesWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be non-zero");
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<f32> {
        self.samples.back().copied()
    }

    /// Points for egui_plot, x = index within the window
    pub fn plot_points(&self) -> Vec<[f64; 2]> {
        self.samples
            .iter()
            .enumerate()
            .map(|(i, &v)| [i as f64, v as f64])
            .collect()
    }
}

/// All channel windows plus the running frame counter
#[derive(Debug)]
pub struct TelemetryHistory {
    windows: Vec<SeriesWindow>,
    frames_seen: u64,
}

impl TelemetryHistory {
    pub fn new(channel_count: usize, window_len: usize) -> Self {
        Self {
            windows: (0..channel_count)
                .map(|_| SeriesWindow::new(window_len))
                .collect(),
            frames_seen: 0,
        }
    }

    /// Fan one frame out to all channel windows.
    ///
    /// Frames come from the parser with the exact channel count, so a length
    /// mismatch here is a programming error.
    pub fn push_frame(&mut self, values: &[f32]) {
        debug_assert_eq!(values.len(), self.windows.len());
        for (window, &v) in self.windows.iter_mut().zip(values.iter()) {
            window.push(v);
        }
        self.frames_seen += 1;
    }

    pub fn channel(&self, idx: usize) -> Option<&SeriesWindow> {
        self.windows.get(idx)
    }

    pub fn channel_count(&self) -> usize {
        self.windows.len()
    }

    pub fn window_len(&self) -> usize {
        self.windows.first().map(|w| w.capacity()).unwrap_or(0)
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn latest(&self, idx: usize) -> Option<f32> {
        self.windows.get(idx).and_then(|w| w.latest())
    }
}

/// One plot in the chart grid: which channels it draws and its initial
/// y-range before auto-scaling takes over.
#[derive(Debug, Clone)]
pub struct ChartSpec {
    pub title: String,
    pub y_label: String,
    pub channels: Vec<usize>,
    pub y_range: (f64, f64),
}

/// Chart grouping for the stock 7-channel layout: speed charts measured and
/// target speed together, voltage charts DC-link, target motor voltage and
/// PWM duty together. Non-stock layouts get one chart per channel.
pub fn default_charts(channels: &[ChannelSpec]) -> Vec<ChartSpec> {
    if channels.len() != 7 {
        return channels
            .iter()
            .enumerate()
            .map(|(idx, ch)| ChartSpec {
                title: ch.label.clone(),
                y_label: ch.unit.clone(),
                channels: vec![idx],
                y_range: (0.0, 1.0),
            })
            .collect();
    }
    let groups: [(&str, &str, usize, (f64, f64)); 4] = [
        ("Speed", "n/rpm", 2, (0.0, 1000.0)),
        ("Torque", "M/Nm", 1, (0.0, 1.0)),
        ("Voltage", "U/V", 3, (-1.0, 32.0)),
        ("Current", "I/A", 1, (-6.0, 6.0)),
    ];
    let mut charts = Vec::with_capacity(groups.len());
    let mut next = 0usize;
    for (title, y_label, count, y_range) in groups {
        let end = next + count;
        charts.push(ChartSpec {
            title: title.to_string(),
            y_label: y_label.to_string(),
            channels: (next..end).collect(),
            y_range,
        });
        next = end;
    }
    charts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::default_channels;

    #[test]
    fn test_window_evicts_oldest() {
        let mut w = SeriesWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            w.push(v);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(w.plot_points(), vec![[0.0, 2.0], [1.0, 3.0], [2.0, 4.0]]);
        assert_eq!(w.latest(), Some(4.0));
    }

    #[test]
    fn test_window_never_exceeds_capacity() {
        let mut w = SeriesWindow::new(100);
        for i in 0..250 {
            w.push(i as f32);
        }
        assert_eq!(w.len(), 100);
        assert_eq!(w.latest(), Some(249.0));
    }

    #[test]
    fn test_empty_window() {
        let w = SeriesWindow::new(5);
        assert!(w.is_empty());
        assert_eq!(w.latest(), None);
        assert!(w.plot_points().is_empty());
    }

    #[test]
    fn test_history_lockstep() {
        let mut h = TelemetryHistory::new(3, 4);
        h.push_frame(&[1.0, 2.0, 3.0]);
        h.push_frame(&[4.0, 5.0, 6.0]);
        assert_eq!(h.frames_seen(), 2);
        for idx in 0..3 {
            assert_eq!(h.channel(idx).unwrap().len(), 2);
        }
        assert_eq!(h.latest(0), Some(4.0));
        assert_eq!(h.latest(2), Some(6.0));
        assert!(h.channel(3).is_none());
    }

    #[test]
    fn test_default_chart_grouping() {
        let charts = default_charts(&default_channels());
        assert_eq!(charts.len(), 4);
        let per_chart: Vec<usize> = charts.iter().map(|c| c.channels.len()).collect();
        assert_eq!(per_chart, vec![2, 1, 3, 1]);
        // Every channel appears exactly once, in order
        let flat: Vec<usize> = charts.iter().flat_map(|c| c.channels.clone()).collect();
        assert_eq!(flat, vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(charts[2].title, "Voltage");
    }

    #[test]
    fn test_non_stock_layout_charts_per_channel() {
        let channels = vec![
            crate::telemetry::ChannelSpec::new("Speed", "rpm"),
            crate::telemetry::ChannelSpec::new("Current", "A"),
        ];
        let charts = default_charts(&channels);
        assert_eq!(charts.len(), 2);
        assert_eq!(charts[0].channels, vec![0]);
        assert_eq!(charts[1].title, "Current");
    }
}
