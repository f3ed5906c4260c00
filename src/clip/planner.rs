//! Choosing which parts of a source to cut.
//!
//! There is no viewer data behind this: windows are centred on evenly spaced
//! fractional positions `(i+1)/(count+1)` of the source, which keeps them away
//! from intros and outros. It is a deterministic, content-agnostic heuristic,
//! not a measure of what is most watched.

use super::Window;

/// Plan `clip_count` windows of `clip_length` seconds over a source of `total` seconds.
///
/// A source no longer than `clip_length` yields one window spanning all of it.
/// Windows may overlap when many clips are requested from a short source.
/// A `total` of zero means the duration is unknown; one window from the start is planned.
pub fn plan(total: u64, clip_length: u64, clip_count: usize) -> Vec<Window> {
    if total == 0 {
        return vec![Window {
            index: 1,
            start_seconds: 0,
            end_seconds: clip_length,
        }];
    }

    if total <= clip_length {
        return vec![Window {
            index: 1,
            start_seconds: 0,
            end_seconds: total,
        }];
    }

    let slots = clip_count as u64 + 1;
    (0..clip_count)
        .map(|i| {
            let centre = total * (i as u64 + 1) / slots;
            let start = centre
                .saturating_sub(clip_length / 2)
                .min(total - clip_length);
            Window {
                index: i + 1,
                start_seconds: start,
                end_seconds: start + clip_length,
            }
        })
        .collect()
}

/// Plan the single window of a user-supplied range, clipped to the source.
pub fn plan_range(total: u64, start: u64, end: u64) -> Vec<Window> {
    let end = if total > 0 { end.min(total) } else { end };
    vec![Window {
        index: 1,
        start_seconds: start.min(end),
        end_seconds: end,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_three_windows() {
        let windows = plan(600, 20, 3);
        assert_eq!(windows.len(), 3);
        for w in &windows {
            assert_eq!(w.length(), 20);
            assert!(w.end_seconds <= 600);
        }
        assert_eq!(windows[0].start_seconds, 140);
        assert_eq!(windows[1].start_seconds, 290);
        assert_eq!(windows[2].start_seconds, 440);
    }

    #[test]
    fn test_plan_short_source() {
        let windows = plan(10, 20, 3);
        assert_eq!(
            windows,
            vec![Window {
                index: 1,
                start_seconds: 0,
                end_seconds: 10
            }]
        );
    }

    #[test]
    fn test_plan_exact_length_source() {
        let windows = plan(20, 20, 2);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].end_seconds, 20);
    }

    #[test]
    fn test_plan_interior_bias() {
        let windows = plan(300, 10, 2);
        assert_eq!(windows.len(), 2);
        assert_eq!((windows[0].start_seconds, windows[0].end_seconds), (95, 105));
        assert_eq!((windows[1].start_seconds, windows[1].end_seconds), (195, 205));
    }

    #[test]
    fn test_plan_clamps_to_edges() {
        // Centres at 16 and 83 with a 90s clip: first clamps at 0, last at the end
        let windows = plan(100, 90, 5);
        assert_eq!(windows[0].start_seconds, 0);
        assert_eq!(windows[4].start_seconds, 10);
        assert!(windows.iter().all(|w| w.end_seconds <= 100 && w.length() == 90));

        let windows = plan(30, 28, 1);
        assert_eq!(windows[0].start_seconds, 1);
        assert_eq!(windows[0].end_seconds, 29);
    }

    #[test]
    fn test_plan_indices_in_order() {
        let windows = plan(1000, 10, 5);
        let indices: Vec<usize> = windows.iter().map(|w| w.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5]);
        assert!(windows
            .windows(2)
            .all(|pair| pair[0].start_seconds < pair[1].start_seconds));
    }

    #[test]
    fn test_plan_unknown_duration() {
        let windows = plan(0, 30, 3);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].end_seconds, 30);
    }

    #[test]
    fn test_plan_range_clipped() {
        let windows = plan_range(200, 152, 203);
        assert_eq!(windows[0].start_seconds, 152);
        assert_eq!(windows[0].end_seconds, 200);

        let windows = plan_range(0, 10, 20);
        assert_eq!(windows[0].end_seconds, 20);
    }
}
