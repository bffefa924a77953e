//! Whiteboard-Dokument mit Seiten und Strichen
//!
//! Jede Operation wird lokal angewendet und danach unverändert an den Peer
//! gesendet. `add-point` trägt eine Sequenznummer pro Strich, damit der
//! Empfänger die Punkte in Sendereihenfolge anwendet, auch wenn sie
//! vertauscht oder doppelt ankommen. Remote-Striche bleiben dafür offen,
//! bis sie entfernt werden.

use super::eraser;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

/// Maximale Anzahl Seiten pro Dokument
pub const MAX_PAGES: usize = 50;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WhiteboardError {
    #[error("Page limit of {0} reached")]
    PageLimit(usize),

    #[error("Unknown page: {0}")]
    UnknownPage(u32),

    #[error("Unknown path: {0}")]
    UnknownPath(String),

    #[error("Path is already closed: {0}")]
    PathClosed(String),
}

// ============================================================================
// DOCUMENT TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Pen,
    Highlighter,
    Eraser,
}

/// Wer den Strich gezeichnet hat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokeOrigin {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub id: String,
    pub tool: Tool,
    pub color: String,
    pub size: f64,
    pub points: Vec<Point>,
    origin: StrokeOrigin,
    open: bool,
    next_seq: u32,
    /// Vorzeitig eingetroffene Punkte, nach Sequenznummer
    pending: BTreeMap<u32, Point>,
}

impl Stroke {
    fn new(op: &StartPath, origin: StrokeOrigin) -> Self {
        Self {
            id: op.path_id.clone(),
            tool: op.tool,
            color: op.color.clone(),
            size: op.size,
            points: vec![op.point],
            origin,
            open: true,
            next_seq: 1,
            pending: BTreeMap::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn origin(&self) -> StrokeOrigin {
        self.origin
    }

    /// Wendet einen Punkt mit Sequenznummer an. Gibt die Anzahl neu
    /// angehängter Punkte zurück.
    fn insert(&mut self, seq: u32, point: Point) -> usize {
        if seq < self.next_seq || self.pending.contains_key(&seq) {
            tracing::debug!("Dropping duplicate point {} for path {}", seq, self.id);
            return 0;
        }
        self.pending.insert(seq, point);

        let mut appended = 0;
        while let Some(point) = self.pending.remove(&self.next_seq) {
            self.points.push(point);
            self.next_seq += 1;
            appended += 1;
        }
        appended
    }

    fn close(&mut self) {
        if !self.pending.is_empty() {
            tracing::warn!(
                "Closing path {} with {} out-of-order point(s) still missing predecessors",
                self.id,
                self.pending.len()
            );
        }
        self.open = false;
        self.pending.clear();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhiteboardPage {
    pub page_number: u32,
    /// In Erstellungsreihenfolge, der letzte liegt oben
    pub strokes: Vec<Stroke>,
}

impl WhiteboardPage {
    fn new(page_number: u32) -> Self {
        Self {
            page_number,
            strokes: Vec::new(),
        }
    }

    fn stroke_mut(&mut self, path_id: &str) -> Option<&mut Stroke> {
        self.strokes.iter_mut().find(|s| s.id == path_id)
    }
}

/// Scroll-Position des Viewports (nur gespiegelt, nicht maßgeblich)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub x: f64,
    pub y: f64,
}

// ============================================================================
// OPERATIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPath {
    pub page_number: u32,
    pub path_id: String,
    pub tool: Tool,
    pub color: String,
    pub size: f64,
    pub point: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPoint {
    pub page_number: u32,
    pub path_id: String,
    /// Beginnt bei 1, der Startpunkt hat implizit 0
    pub seq: u32,
    pub point: Point,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovePath {
    pub page_number: u32,
    pub path_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearPage {
    pub page_number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPage {
    pub page_number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchPage {
    pub page_number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollTo {
    pub page_number: u32,
    pub x: f64,
    pub y: f64,
}

/// Eine Whiteboard-Operation, wie sie über das Relay geht
#[derive(Debug, Clone, PartialEq)]
pub enum WhiteboardOp {
    StartPath(StartPath),
    AddPoint(AddPoint),
    RemovePath(RemovePath),
    ClearPage(ClearPage),
    AddPage(AddPage),
    SwitchPage(SwitchPage),
    ScrollTo(ScrollTo),
}

// ============================================================================
// DOCUMENT
// ============================================================================

#[derive(Debug, Clone)]
pub struct WhiteboardDocument {
    pages: Vec<WhiteboardPage>,
    current_page: u32,
    scroll: ScrollPosition,
    /// path_id → Seite
    index: HashMap<String, u32>,
    /// Punkte für Striche, deren start-path noch fehlt
    orphans: HashMap<String, BTreeMap<u32, Point>>,
    /// Entfernte Striche, späte Punkte dafür werden verworfen
    removed: HashSet<String>,
    open_local: Option<String>,
}

impl Default for WhiteboardDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl WhiteboardDocument {
    /// Neues Dokument mit Seite 1
    pub fn new() -> Self {
        Self {
            pages: vec![WhiteboardPage::new(1)],
            current_page: 1,
            scroll: ScrollPosition::default(),
            index: HashMap::new(),
            orphans: HashMap::new(),
            removed: HashSet::new(),
            open_local: None,
        }
    }

    pub fn pages(&self) -> &[WhiteboardPage] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn current_page_number(&self) -> u32 {
        self.current_page
    }

    pub fn page(&self, page_number: u32) -> Option<&WhiteboardPage> {
        self.pages.iter().find(|p| p.page_number == page_number)
    }

    pub fn current_page(&self) -> Option<&WhiteboardPage> {
        self.page(self.current_page)
    }

    pub fn scroll(&self) -> ScrollPosition {
        self.scroll
    }

    pub fn stroke(&self, path_id: &str) -> Option<&Stroke> {
        let page_number = self.index.get(path_id)?;
        self.page(*page_number)?
            .strokes
            .iter()
            .find(|s| s.id == path_id)
    }

    fn page_mut(&mut self, page_number: u32) -> Result<&mut WhiteboardPage, WhiteboardError> {
        self.pages
            .iter_mut()
            .find(|p| p.page_number == page_number)
            .ok_or(WhiteboardError::UnknownPage(page_number))
    }

    fn stroke_mut(&mut self, path_id: &str) -> Option<&mut Stroke> {
        let page_number = *self.index.get(path_id)?;
        self.page_mut(page_number).ok()?.stroke_mut(path_id)
    }

    // ========================================================================
    // LOKALE OPERATIONEN
    // ========================================================================

    /// Beginnt einen neuen Strich auf der aktuellen Seite
    pub fn start_path(
        &mut self,
        tool: Tool,
        color: impl Into<String>,
        size: f64,
        point: Point,
    ) -> Result<StartPath, WhiteboardError> {
        if let Some(previous) = self.open_local.take() {
            if let Some(stroke) = self.stroke_mut(&previous) {
                stroke.close();
            }
        }

        let op = StartPath {
            page_number: self.current_page,
            path_id: Uuid::new_v4().to_string(),
            tool,
            color: color.into(),
            size,
            point,
        };

        self.insert_stroke(&op, StrokeOrigin::Local)?;
        self.open_local = Some(op.path_id.clone());
        Ok(op)
    }

    /// Hängt einen Punkt an einen offenen lokalen Strich an
    pub fn add_point(&mut self, path_id: &str, point: Point) -> Result<AddPoint, WhiteboardError> {
        let page_number = *self
            .index
            .get(path_id)
            .ok_or_else(|| WhiteboardError::UnknownPath(path_id.to_string()))?;
        let stroke = self
            .stroke_mut(path_id)
            .filter(|s| s.origin == StrokeOrigin::Local)
            .ok_or_else(|| WhiteboardError::UnknownPath(path_id.to_string()))?;

        if !stroke.open {
            return Err(WhiteboardError::PathClosed(path_id.to_string()));
        }

        let seq = stroke.next_seq;
        stroke.insert(seq, point);

        Ok(AddPoint {
            page_number,
            path_id: path_id.to_string(),
            seq,
            point,
        })
    }

    /// Schließt einen lokalen Strich, danach ist er unveränderlich
    pub fn end_path(&mut self, path_id: &str) -> Result<(), WhiteboardError> {
        let stroke = self
            .stroke_mut(path_id)
            .filter(|s| s.origin == StrokeOrigin::Local)
            .ok_or_else(|| WhiteboardError::UnknownPath(path_id.to_string()))?;
        stroke.close();

        if self.open_local.as_deref() == Some(path_id) {
            self.open_local = None;
        }
        Ok(())
    }

    /// Radiert den obersten getroffenen Strich der aktuellen Seite
    pub fn erase_at(&mut self, point: Point) -> Option<RemovePath> {
        let page = self.current_page()?;
        let hit = eraser::hit_test(&page.strokes, point)?.id.clone();
        self.remove_path(&hit).ok()
    }

    pub fn remove_path(&mut self, path_id: &str) -> Result<RemovePath, WhiteboardError> {
        let page_number = self
            .take_stroke(path_id)
            .ok_or_else(|| WhiteboardError::UnknownPath(path_id.to_string()))?;
        Ok(RemovePath {
            page_number,
            path_id: path_id.to_string(),
        })
    }

    pub fn clear_page(&mut self, page_number: u32) -> Result<ClearPage, WhiteboardError> {
        self.clear_strokes(page_number)?;
        Ok(ClearPage { page_number })
    }

    /// Legt eine neue Seite an und wechselt dorthin
    pub fn add_page(&mut self) -> Result<Vec<WhiteboardOp>, WhiteboardError> {
        let page_number = self
            .pages
            .iter()
            .map(|p| p.page_number)
            .max()
            .unwrap_or(0)
            + 1;

        self.insert_page(page_number)?;
        self.current_page = page_number;

        Ok(vec![
            WhiteboardOp::AddPage(AddPage { page_number }),
            WhiteboardOp::SwitchPage(SwitchPage { page_number }),
        ])
    }

    pub fn switch_page(&mut self, page_number: u32) -> Result<SwitchPage, WhiteboardError> {
        self.page_mut(page_number)?;
        self.current_page = page_number;
        Ok(SwitchPage { page_number })
    }

    pub fn scroll_to(&mut self, x: f64, y: f64) -> ScrollTo {
        self.scroll = ScrollPosition { x, y };
        ScrollTo {
            page_number: self.current_page,
            x,
            y,
        }
    }

    // ========================================================================
    // REMOTE OPERATIONEN
    // ========================================================================

    /// Wendet eine Operation des Peers an. `true` wenn sich etwas geändert hat.
    pub fn apply_remote(&mut self, op: WhiteboardOp) -> Result<bool, WhiteboardError> {
        match op {
            WhiteboardOp::StartPath(op) => {
                if self.index.contains_key(&op.path_id) || self.removed.contains(&op.path_id) {
                    return Ok(false);
                }

                self.insert_stroke(&op, StrokeOrigin::Remote)?;

                if let Some(orphans) = self.orphans.remove(&op.path_id) {
                    if let Some(stroke) = self.stroke_mut(&op.path_id) {
                        for (seq, point) in orphans {
                            stroke.insert(seq, point);
                        }
                    }
                }
                Ok(true)
            }

            WhiteboardOp::AddPoint(op) => {
                if self.removed.contains(&op.path_id) {
                    return Ok(false);
                }

                match self.stroke_mut(&op.path_id) {
                    Some(stroke) if stroke.open => Ok(stroke.insert(op.seq, op.point) > 0),
                    Some(_) => {
                        tracing::debug!("Dropping point for closed path {}", op.path_id);
                        Ok(false)
                    }
                    None => {
                        self.orphans
                            .entry(op.path_id)
                            .or_default()
                            .insert(op.seq, op.point);
                        Ok(false)
                    }
                }
            }

            WhiteboardOp::RemovePath(op) => {
                self.orphans.remove(&op.path_id);
                let removed = self.take_stroke(&op.path_id).is_some();
                self.removed.insert(op.path_id);
                Ok(removed)
            }

            WhiteboardOp::ClearPage(op) => {
                self.clear_strokes(op.page_number)?;
                Ok(true)
            }

            WhiteboardOp::AddPage(op) => {
                if self.page(op.page_number).is_some() {
                    return Ok(false);
                }
                self.insert_page(op.page_number)?;
                Ok(true)
            }

            WhiteboardOp::SwitchPage(op) => {
                self.page_mut(op.page_number)?;
                let changed = self.current_page != op.page_number;
                self.current_page = op.page_number;
                Ok(changed)
            }

            WhiteboardOp::ScrollTo(op) => {
                if op.page_number != self.current_page {
                    return Ok(false);
                }
                self.scroll = ScrollPosition { x: op.x, y: op.y };
                Ok(true)
            }
        }
    }

    // ========================================================================
    // HILFSFUNKTIONEN
    // ========================================================================

    fn insert_stroke(&mut self, op: &StartPath, origin: StrokeOrigin) -> Result<(), WhiteboardError> {
        let page = self.page_mut(op.page_number)?;
        page.strokes.push(Stroke::new(op, origin));
        self.index.insert(op.path_id.clone(), op.page_number);
        Ok(())
    }

    fn take_stroke(&mut self, path_id: &str) -> Option<u32> {
        let page_number = self.index.remove(path_id)?;
        let page = self.page_mut(page_number).ok()?;
        page.strokes.retain(|s| s.id != path_id);
        self.forget_open(path_id);
        self.removed.insert(path_id.to_string());
        Some(page_number)
    }

    fn clear_strokes(&mut self, page_number: u32) -> Result<(), WhiteboardError> {
        let page = self.page_mut(page_number)?;
        let ids: Vec<String> = page.strokes.drain(..).map(|s| s.id).collect();
        for id in ids {
            self.index.remove(&id);
            self.forget_open(&id);
            self.removed.insert(id);
        }
        Ok(())
    }

    fn forget_open(&mut self, path_id: &str) {
        if self.open_local.as_deref() == Some(path_id) {
            self.open_local = None;
        }
    }

    fn insert_page(&mut self, page_number: u32) -> Result<(), WhiteboardError> {
        if self.pages.len() >= MAX_PAGES {
            tracing::warn!("Rejecting page {}, limit of {} reached", page_number, MAX_PAGES);
            return Err(WhiteboardError::PageLimit(MAX_PAGES));
        }
        let position = self
            .pages
            .iter()
            .position(|p| p.page_number > page_number)
            .unwrap_or(self.pages.len());
        self.pages.insert(position, WhiteboardPage::new(page_number));
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn start(doc: &mut WhiteboardDocument) -> StartPath {
        doc.start_path(Tool::Pen, "#000000", 2.0, p(0.0, 0.0)).unwrap()
    }

    #[test]
    fn test_local_ops_are_replayed_remotely() {
        let mut local = WhiteboardDocument::new();
        let mut remote = WhiteboardDocument::new();

        let start_op = start(&mut local);
        let a = local.add_point(&start_op.path_id, p(1.0, 1.0)).unwrap();
        let b = local.add_point(&start_op.path_id, p(2.0, 2.0)).unwrap();
        assert_eq!((a.seq, b.seq), (1, 2));

        remote.apply_remote(WhiteboardOp::StartPath(start_op.clone())).unwrap();
        remote.apply_remote(WhiteboardOp::AddPoint(a)).unwrap();
        remote.apply_remote(WhiteboardOp::AddPoint(b)).unwrap();

        assert_eq!(
            remote.stroke(&start_op.path_id).unwrap().points,
            local.stroke(&start_op.path_id).unwrap().points
        );
    }

    #[test]
    fn test_out_of_order_points_keep_emission_order() {
        let mut local = WhiteboardDocument::new();
        let mut remote = WhiteboardDocument::new();

        let start_op = start(&mut local);
        let ops: Vec<AddPoint> = (1..=5)
            .map(|i| local.add_point(&start_op.path_id, p(i as f64, 0.0)).unwrap())
            .collect();

        // Punkte vor dem start-path und in vertauschter Reihenfolge, einer doppelt
        remote.apply_remote(WhiteboardOp::AddPoint(ops[2].clone())).unwrap();
        remote.apply_remote(WhiteboardOp::StartPath(start_op.clone())).unwrap();
        for i in [4, 0, 1, 1, 3] {
            remote.apply_remote(WhiteboardOp::AddPoint(ops[i].clone())).unwrap();
        }

        let xs: Vec<f64> = remote
            .stroke(&start_op.path_id)
            .unwrap()
            .points
            .iter()
            .map(|pt| pt.x)
            .collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_closed_path_is_immutable() {
        let mut doc = WhiteboardDocument::new();
        let op = start(&mut doc);
        doc.end_path(&op.path_id).unwrap();
        assert_eq!(
            doc.add_point(&op.path_id, p(1.0, 1.0)),
            Err(WhiteboardError::PathClosed(op.path_id.clone()))
        );

        // neuer lokaler Strich schließt den vorherigen
        let first = start(&mut doc);
        let second = start(&mut doc);
        assert!(!doc.stroke(&first.path_id).unwrap().is_open());
        assert!(doc.stroke(&second.path_id).unwrap().is_open());
    }

    #[test]
    fn test_late_points_after_next_remote_start() {
        let mut local = WhiteboardDocument::new();
        let mut remote = WhiteboardDocument::new();

        let first = start(&mut local);
        let a1 = local.add_point(&first.path_id, p(1.0, 1.0)).unwrap();
        let a2 = local.add_point(&first.path_id, p(2.0, 2.0)).unwrap();
        let second = start(&mut local);
        let b1 = local.add_point(&second.path_id, p(5.0, 5.0)).unwrap();

        remote.apply_remote(WhiteboardOp::StartPath(first.clone())).unwrap();
        remote.apply_remote(WhiteboardOp::AddPoint(a2)).unwrap();
        remote.apply_remote(WhiteboardOp::StartPath(second.clone())).unwrap();
        remote.apply_remote(WhiteboardOp::AddPoint(b1)).unwrap();
        assert!(remote.apply_remote(WhiteboardOp::AddPoint(a1.clone())).unwrap());
        assert!(!remote.apply_remote(WhiteboardOp::AddPoint(a1)).unwrap());

        for path_id in [&first.path_id, &second.path_id] {
            assert_eq!(
                remote.stroke(path_id).unwrap().points,
                local.stroke(path_id).unwrap().points
            );
        }
        assert_eq!(remote.stroke(&first.path_id).unwrap().points.len(), 3);
    }

    #[test]
    fn test_page_limit() {
        let mut doc = WhiteboardDocument::new();
        for _ in 1..MAX_PAGES {
            doc.add_page().unwrap();
        }
        assert_eq!(doc.page_count(), MAX_PAGES);
        assert_eq!(doc.current_page_number(), 50);

        // der 51. Versuch wird abgelehnt
        assert_eq!(doc.add_page(), Err(WhiteboardError::PageLimit(MAX_PAGES)));
        assert_eq!(
            doc.apply_remote(WhiteboardOp::AddPage(AddPage { page_number: 51 })),
            Err(WhiteboardError::PageLimit(MAX_PAGES))
        );
        assert_eq!(doc.page_count(), MAX_PAGES);
    }

    #[test]
    fn test_remote_page_ops() {
        let mut doc = WhiteboardDocument::new();
        assert!(doc
            .apply_remote(WhiteboardOp::AddPage(AddPage { page_number: 2 }))
            .unwrap());
        // doppelt zugestellt
        assert!(!doc
            .apply_remote(WhiteboardOp::AddPage(AddPage { page_number: 2 }))
            .unwrap());
        assert!(doc
            .apply_remote(WhiteboardOp::SwitchPage(SwitchPage { page_number: 2 }))
            .unwrap());
        assert_eq!(doc.current_page_number(), 2);

        assert_eq!(
            doc.apply_remote(WhiteboardOp::SwitchPage(SwitchPage { page_number: 7 })),
            Err(WhiteboardError::UnknownPage(7))
        );
        assert_eq!(doc.switch_page(1), Ok(SwitchPage { page_number: 1 }));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut doc = WhiteboardDocument::new();
        let a = start(&mut doc);
        let b = start(&mut doc);

        let removed = doc.remove_path(&a.path_id).unwrap();
        assert_eq!(removed.page_number, 1);
        assert!(doc.stroke(&a.path_id).is_none());
        assert!(doc.remove_path(&a.path_id).is_err());

        doc.clear_page(1).unwrap();
        assert!(doc.stroke(&b.path_id).is_none());
        assert!(doc.current_page().unwrap().strokes.is_empty());

        // späte Punkte für entfernte Striche werden verworfen
        let late = AddPoint {
            page_number: 1,
            path_id: b.path_id.clone(),
            seq: 1,
            point: p(1.0, 1.0),
        };
        assert!(!doc.apply_remote(WhiteboardOp::AddPoint(late)).unwrap());
        assert!(!doc.apply_remote(WhiteboardOp::StartPath(b)).unwrap());
    }

    #[test]
    fn test_erase_removes_topmost_stroke() {
        let mut doc = WhiteboardDocument::new();
        let below = doc.start_path(Tool::Pen, "#000", 2.0, p(0.0, 0.0)).unwrap();
        doc.add_point(&below.path_id, p(100.0, 0.0)).unwrap();
        let above = doc.start_path(Tool::Pen, "#f00", 2.0, p(0.0, 2.0)).unwrap();
        doc.add_point(&above.path_id, p(100.0, 2.0)).unwrap();

        let op = doc.erase_at(p(50.0, 1.0)).unwrap();
        assert_eq!(op.path_id, above.path_id);
        assert!(doc.stroke(&below.path_id).is_some());

        assert!(doc.erase_at(p(50.0, 80.0)).is_none());
    }

    #[test]
    fn test_scroll_follows_current_page() {
        let mut doc = WhiteboardDocument::new();
        let op = doc.scroll_to(10.0, 250.0);
        assert_eq!(op.page_number, 1);
        assert_eq!(doc.scroll(), ScrollPosition { x: 10.0, y: 250.0 });

        // Scroll für eine andere Seite wird ignoriert
        assert!(!doc
            .apply_remote(WhiteboardOp::ScrollTo(ScrollTo {
                page_number: 2,
                x: 0.0,
                y: 0.0
            }))
            .unwrap());
    }
}
