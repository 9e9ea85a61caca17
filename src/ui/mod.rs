pub mod components;
pub mod renderfns;
pub mod view;
pub mod views;

use crate::app::App;
use ratatui::prelude::*;
use ratatui::widgets::ListState;
use renderfns::{draw_footer, draw_header};
use view::View;

/// Keep a list selection inside `0..len`, selecting the first row when
/// nothing is selected yet
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  if len == 0 {
    state.select(None);
    return;
  }
  match state.selected() {
    Some(idx) if idx >= len => state.select(Some(len - 1)),
    None => state.select(Some(0)),
    _ => {}
  }
}

/// Main draw function
pub fn draw(frame: &mut Frame, app: &mut App) {
  let [header_area, content_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Min(1),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  let context = app.current_view().context();
  let shortcuts = app.current_view().shortcuts();
  draw_header(
    frame,
    header_area,
    app.base_url(),
    context.as_deref(),
    &shortcuts,
  );

  app.current_view_mut().render(frame, content_area);

  let breadcrumb = app.breadcrumb();
  draw_footer(frame, footer_area, &breadcrumb, app.status());

  app.command().render_overlay(frame, content_area);
}
