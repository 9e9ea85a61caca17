use super::input::{InputResult, TextInput};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// What a form field accepts
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
  Text,
  /// Digits, sign and decimal point only; range checks happen on submit
  Number,
  /// Free text that Left/Right cycle through a list of options
  Choice(Vec<String>),
}

/// A labelled input row in an edit form
#[derive(Debug, Clone)]
pub struct FormField {
  label: &'static str,
  kind: FieldKind,
  input: TextInput,
  required: bool,
}

impl FormField {
  pub fn new(label: &'static str, kind: FieldKind, value: &str) -> Self {
    Self {
      label,
      kind,
      input: TextInput::with_value(value),
      required: false,
    }
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  pub fn label(&self) -> &'static str {
    self.label
  }

  pub fn value(&self) -> &str {
    self.input.value()
  }

  pub fn set_value(&mut self, value: &str) {
    self.input.set_value(value);
  }

  /// Replace the options of a choice field
  pub fn set_options(&mut self, options: Vec<String>) {
    if let FieldKind::Choice(current) = &mut self.kind {
      *current = options;
    }
  }

  fn cycle(&mut self, forward: bool) -> bool {
    let FieldKind::Choice(options) = &self.kind else {
      return false;
    };
    if options.is_empty() {
      return false;
    }
    let len = options.len();
    let next = match options.iter().position(|o| o == self.input.value()) {
      Some(i) if forward => (i + 1) % len,
      Some(i) => (i + len - 1) % len,
      None => 0,
    };
    let value = options[next].clone();
    self.input.set_value(&value);
    true
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> InputResult {
    match key.code {
      KeyCode::Left if self.cycle(false) => InputResult::Consumed,
      KeyCode::Right if self.cycle(true) => InputResult::Consumed,
      KeyCode::Char(c)
        if self.kind == FieldKind::Number && !(c.is_ascii_digit() || c == '.' || c == '-') =>
      {
        // Swallow so the key does not trigger a view shortcut
        InputResult::Consumed
      }
      _ => self.input.handle_key(key),
    }
  }

  pub fn render(&self, frame: &mut Frame, area: Rect, focused: bool) {
    let label_style = if focused {
      Style::default().fg(Color::Yellow).bold()
    } else {
      Style::default().fg(Color::DarkGray)
    };
    let marker = if self.required { "*" } else { " " };

    let mut spans = vec![
      Span::styled(format!("{:>12}{} ", self.label, marker), label_style),
    ];
    if focused {
      let (before, after) = split_at_char(self.value(), self.input.cursor_position());
      spans.push(Span::raw(before.to_string()));
      spans.push(Span::styled("▏", Style::default().fg(Color::Yellow)));
      spans.push(Span::raw(after.to_string()));
    } else {
      spans.push(Span::raw(self.value().to_string()));
    }
    if let FieldKind::Choice(options) = &self.kind {
      if focused && !options.is_empty() {
        spans.push(Span::styled(
          format!("  ◀ ▶ {} options", options.len()),
          Style::default().fg(Color::DarkGray),
        ));
      }
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
  }
}

fn split_at_char(s: &str, pos: usize) -> (&str, &str) {
  let at = s.char_indices().nth(pos).map_or(s.len(), |(i, _)| i);
  s.split_at(at)
}
