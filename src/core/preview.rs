//! Quick inspection of a sample's events.

use crate::channel::types::Event;
use serde::Serialize;

/// Sensor width and height in pixels.
const SENSOR_SIDE: u32 = 128;

/// Summary statistics of one event recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    pub events: usize,
    pub on_events: usize,
    pub off_events: usize,
    pub first_timestamp: Option<u32>,
    pub last_timestamp: Option<u32>,
    /// Events that would be cut by the time budget
    pub beyond_budget: usize,
    /// Adjacent pairs whose timestamp goes backwards
    pub out_of_order: usize,
}

pub fn summarize(events: &[Event], time_budget: u32) -> EventSummary {
    let on_events = events.iter().filter(|e| e.polarity == 1).count();

    EventSummary {
        events: events.len(),
        on_events,
        off_events: events.len() - on_events,
        first_timestamp: events.first().map(|e| e.timestamp),
        last_timestamp: events.last().map(|e| e.timestamp),
        beyond_budget: events
            .iter()
            .position(|e| e.timestamp > time_budget)
            .map(|i| events.len() - i)
            .unwrap_or(0),
        out_of_order: events
            .windows(2)
            .filter(|pair| pair[1].timestamp < pair[0].timestamp)
            .count(),
    }
}

/// Render a `side x side` character map of event polarity.
///
/// `+` on events only, `-` off events only, `*` both, `.` none. The sensor is
/// viewed flipped on both axes, with rows following `x`.
pub fn render_polarity_map(events: &[Event], side: usize) -> String {
    let side = side.clamp(1, SENSOR_SIDE as usize);
    let cell = SENSOR_SIDE as usize / side;
    // bit 0: on seen, bit 1: off seen
    let mut grid = vec![0u8; side * side];

    for event in events {
        if event.x >= SENSOR_SIDE || event.y >= SENSOR_SIDE {
            continue;
        }
        let row = ((SENSOR_SIDE - 1 - event.x) as usize / cell).min(side - 1);
        let col = ((SENSOR_SIDE - 1 - event.y) as usize / cell).min(side - 1);
        grid[row * side + col] |= if event.polarity == 1 { 1 } else { 2 };
    }

    let mut out = String::with_capacity(side * (side + 1));
    for row in grid.chunks(side) {
        for &cell in row {
            out.push(match cell {
                1 => '+',
                2 => '-',
                3 => '*',
                _ => '.',
            });
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        let events = vec![
            Event::new(1, 1, 10, 1),
            Event::new(1, 1, 5, 0),
            Event::new(1, 1, 300_000, 1),
        ];
        let summary = summarize(&events, 200_000);

        assert_eq!(summary.events, 3);
        assert_eq!(summary.on_events, 2);
        assert_eq!(summary.off_events, 1);
        assert_eq!(summary.first_timestamp, Some(10));
        assert_eq!(summary.last_timestamp, Some(300_000));
        assert_eq!(summary.beyond_budget, 1);
        assert_eq!(summary.out_of_order, 1);
    }

    #[test]
    fn test_empty_summary() {
        let summary = summarize(&[], 200_000);
        assert_eq!(summary.events, 0);
        assert_eq!(summary.first_timestamp, None);
    }

    #[test]
    fn test_polarity_map() {
        let events = vec![
            Event::new(127, 127, 0, 1),
            Event::new(0, 0, 1, 0),
            Event::new(0, 0, 2, 1),
            Event::new(500, 0, 3, 1),
        ];
        let map = render_polarity_map(&events, 4);
        let rows: Vec<&str> = map.lines().collect();

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], "+...");
        assert_eq!(rows[3], "...*");
    }
}
