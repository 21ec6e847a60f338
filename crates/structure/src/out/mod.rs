/// Pythonish plain-text rendering of the structured tree.
pub mod text;

/// Self-contained HTML report with a folding UI and source cross-links.
pub mod html;
