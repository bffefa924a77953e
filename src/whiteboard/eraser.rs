//! Radierer: Treffertest gegen die Striche einer Seite

use super::document::{Point, Stroke};

/// Mindestradius eines Strichs für den Treffertest
const MIN_HALF_WIDTH: f64 = 5.0;

/// Zusätzlicher Spielraum um den Strich
const HIT_SLOP: f64 = 5.0;

/// Toleranz in Pixeln: `max(size / 2, 5) + 5`
pub fn hit_tolerance(size: f64) -> f64 {
    (size / 2.0).max(MIN_HALF_WIDTH) + HIT_SLOP
}

/// Abstand eines Punkts zur Strecke a-b
pub fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;

    if len_sq == 0.0 {
        return (p.x - a.x).hypot(p.y - a.y);
    }

    // Projektion auf die Strecke, auf [0, 1] begrenzt
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    let cx = a.x + t * dx;
    let cy = a.y + t * dy;
    (p.x - cx).hypot(p.y - cy)
}

/// Kleinster Abstand zu irgendeinem Segment des Strichs
pub fn distance_to_stroke(p: Point, stroke: &Stroke) -> Option<f64> {
    match stroke.points.as_slice() {
        [] => None,
        [only] => Some(distance_to_segment(p, *only, *only)),
        points => points
            .windows(2)
            .map(|w| distance_to_segment(p, w[0], w[1]))
            .reduce(f64::min),
    }
}

/// Oberster getroffener Strich (zuletzt erstellt gewinnt)
pub fn hit_test(strokes: &[Stroke], p: Point) -> Option<&Stroke> {
    strokes.iter().rev().find(|stroke| {
        distance_to_stroke(p, stroke)
            .map(|d| d <= hit_tolerance(stroke.size))
            .unwrap_or(false)
    })
}
