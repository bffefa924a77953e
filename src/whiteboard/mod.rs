//! Whiteboard Module - kollaboratives Zeichnen
//!
//! Dieses Modul verwaltet:
//! - Seiten und Striche mit geordneter Punkt-Replikation
//! - den Treffertest des Radierers
//! - die geteilte Anzeige (Whiteboard oder Bild)

mod display;
mod document;
mod eraser;

pub use display::{DisplayController, DisplayError, SharedDisplay};
pub use document::{
    AddPage, AddPoint, ClearPage, Point, RemovePath, ScrollPosition, ScrollTo, StartPath, Stroke,
    StrokeOrigin, SwitchPage, Tool, WhiteboardDocument, WhiteboardError, WhiteboardOp,
    WhiteboardPage, MAX_PAGES,
};
pub use eraser::{distance_to_segment, hit_test, hit_tolerance};
