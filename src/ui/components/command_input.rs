use super::input::{InputResult, TextInput};
use crate::commands::{self, Command};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph};

/// Maximum suggestions shown under the prompt
const MAX_SUGGESTIONS: usize = 6;

/// What the prompt did with a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptKey {
  /// Not for the prompt; the view gets it
  Ignored,
  Consumed,
  /// Resolved command name, or the raw input if nothing matched
  Submitted(String),
  Cancelled,
}

/// `:` prompt with autocomplete
#[derive(Debug, Clone, Default)]
pub struct CommandInput {
  input: TextInput,
  active: bool,
  selected: usize,
}

impl CommandInput {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  pub fn suggestions(&self) -> Vec<&'static Command> {
    commands::get_suggestions(self.input.value())
  }

  fn close(&mut self) {
    self.active = false;
    self.input.clear();
    self.selected = 0;
  }

  fn step(&mut self, forward: bool) {
    let len = self.suggestions().len();
    if len > 0 {
      self.selected = if forward {
        (self.selected + 1) % len
      } else {
        (self.selected + len - 1) % len
      };
    }
  }

  /// Offer a key. Handles activation on `:` while inactive.
  pub fn handle_key(&mut self, key: KeyEvent) -> PromptKey {
    if !self.active {
      if key.code == KeyCode::Char(':') {
        self.active = true;
        return PromptKey::Consumed;
      }
      return PromptKey::Ignored;
    }

    match key.code {
      KeyCode::Tab | KeyCode::Down => self.step(true),
      KeyCode::BackTab | KeyCode::Up => self.step(false),
      _ => match self.input.handle_key(key) {
        InputResult::Submitted(raw) => {
          let resolved = self
            .suggestions()
            .get(self.selected)
            .map(|cmd| cmd.name.to_string())
            .unwrap_or_else(|| raw.trim().to_lowercase());
          self.close();
          return PromptKey::Submitted(resolved);
        }
        InputResult::Cancelled => {
          self.close();
          return PromptKey::Cancelled;
        }
        InputResult::Consumed => self.selected = 0,
        InputResult::NotHandled => {}
      },
    }
    // Swallow everything while the prompt is open
    PromptKey::Consumed
  }

  /// Render the prompt over the top-left of `area` if active
  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.active {
      return;
    }

    let suggestions = self.suggestions();
    let shown = suggestions.len().min(MAX_SUGGESTIONS) as u16;
    let width = (area.width * 60 / 100).clamp(30, 60).min(area.width);
    let height = (3 + shown).min(area.height);
    let overlay = Rect::new(area.x + 1, area.y + 1, width.saturating_sub(1), height);

    frame.render_widget(Clear, overlay);
    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(" Command ");
    let inner = block.inner(overlay);
    frame.render_widget(block, overlay);
    if inner.height == 0 {
      return;
    }

    let [prompt_area, list_area] =
      Layout::vertical([Constraint::Length(1), Constraint::Min(0)]).areas(inner);

    let prompt = Line::from(vec![
      Span::styled(":", Style::default().fg(Color::Yellow)),
      Span::raw(self.input.value()),
      Span::styled("_", Style::default().fg(Color::Yellow)),
    ]);
    frame.render_widget(Paragraph::new(prompt), prompt_area);

    if suggestions.is_empty() || list_area.height == 0 {
      return;
    }
    let items: Vec<ListItem> = suggestions
      .iter()
      .take(MAX_SUGGESTIONS)
      .map(|cmd| {
        ListItem::new(Line::from(vec![
          Span::styled(format!("{:<10}", cmd.name), Style::default().fg(Color::Cyan)),
          Span::styled(cmd.description, Style::default().fg(Color::DarkGray)),
        ]))
      })
      .collect();
    let list =
      List::new(items).highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White));
    let mut state = ListState::default().with_selected(Some(self.selected));
    frame.render_stateful_widget(list, list_area, &mut state);
  }
}
