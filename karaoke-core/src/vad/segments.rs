//! Turning per-frame activity into time intervals.

use super::VocalSegment;

/// Build raw segments from runs of active frames.
///
/// Frame `i` is centred at `centre(i)`; a run spans from the first active
/// frame's centre to the last one's, clamped to `[0, limit]`.
pub fn runs_to_segments<C>(active: &[bool], centre: C, limit: f64) -> Vec<VocalSegment>
where
    C: Fn(usize) -> f64,
{
    let mut out = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, &on) in active.iter().enumerate() {
        match (on, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(first)) => {
                out.push(span(first, i - 1, &centre, limit));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(first) = run_start {
        out.push(span(first, active.len() - 1, &centre, limit));
    }
    out
}

fn span<C: Fn(usize) -> f64>(first: usize, last: usize, centre: &C, limit: f64) -> VocalSegment {
    let start = centre(first).clamp(0.0, limit);
    let end = centre(last).clamp(start, limit);
    VocalSegment::new(start, end)
}

/// Merge sorted segments whose gap is below `min_gap` (overlaps always merge).
pub fn merge_close(segments: &[VocalSegment], min_gap: f64) -> Vec<VocalSegment> {
    let mut out: Vec<VocalSegment> = Vec::with_capacity(segments.len());
    for seg in segments {
        match out.last_mut() {
            Some(prev) if seg.start - prev.end < min_gap => {
                prev.end = prev.end.max(seg.end);
            }
            _ => out.push(*seg),
        }
    }
    out
}

/// Drop segments shorter than `min_duration`, and any of zero length.
pub fn drop_short(segments: Vec<VocalSegment>, min_duration: f64) -> Vec<VocalSegment> {
    segments
        .into_iter()
        .filter(|s| s.duration() > 0.0 && s.duration() >= min_duration)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn centre(i: usize) -> f64 {
        i as f64 * 0.01 + 0.0125
    }

    #[test]
    fn runs_become_segments() {
        let active = [false, true, true, true, false, false, true, true];
        let segs = runs_to_segments(&active, centre, 1.0);
        assert_eq!(segs.len(), 2);
        assert!((segs[0].start - 0.0225).abs() < 1e-9);
        assert!((segs[0].end - 0.0425).abs() < 1e-9);
        assert!((segs[1].end - 0.0825).abs() < 1e-9);
    }

    #[test]
    fn run_end_is_clamped() {
        let segs = runs_to_segments(&[true, true], centre, 0.015);
        assert_eq!(segs[0].end, 0.015);
    }

    #[test]
    fn close_segments_merge() {
        let segs = [
            VocalSegment::new(0.0, 1.0),
            VocalSegment::new(1.2, 2.0),
            VocalSegment::new(3.0, 4.0),
        ];
        let merged = merge_close(&segs, 0.25);
        assert_eq!(
            merged,
            vec![VocalSegment::new(0.0, 2.0), VocalSegment::new(3.0, 4.0)]
        );
    }

    #[test]
    fn short_segments_drop() {
        let kept = drop_short(
            vec![VocalSegment::new(0.0, 0.2), VocalSegment::new(1.0, 1.5)],
            0.3,
        );
        assert_eq!(kept, vec![VocalSegment::new(1.0, 1.5)]);
    }
}
