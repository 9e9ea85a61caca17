use crate::app::Session;
use crate::cache::QueryHandle;
use crate::catalog::{categories_key, Category, Product, ProductPatch, Review};
use crate::error::{MutationError, ValidationError};
use crate::request::{Request, RequestState};
use crate::ui::components::{FieldKind, FormField};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

const TITLE: usize = 0;
const DESCRIPTION: usize = 1;
const PRICE: usize = 2;
const DISCOUNT: usize = 3;
const RATING: usize = 4;
const STOCK: usize = 5;
const BRAND: usize = 6;
const CATEGORY: usize = 7;
/// Rows before the first review
const PRODUCT_FIELDS: usize = 8;

// Offsets within one review's rows
const REVIEWER: usize = 0;
const EMAIL: usize = 1;
const STARS: usize = 2;
const COMMENT: usize = 3;
const REVIEW_FIELDS: usize = 4;

/// Rows below the fields: spacer, message, help
const FOOTER_ROWS: usize = 3;

fn review_fields(review: &Review) -> [FormField; REVIEW_FIELDS] {
  [
    FormField::new("Review by", FieldKind::Text, &review.reviewer_name).required(),
    FormField::new("Email", FieldKind::Text, &review.reviewer_email).required(),
    FormField::new("Stars", FieldKind::Number, &review.rating.to_string()).required(),
    FormField::new("Comment", FieldKind::Text, &review.comment).required(),
  ]
}

/// Edit form for one product and its reviews
pub struct ProductEditView {
  session: Session,
  original: Product,
  /// Product fields followed by `REVIEW_FIELDS` rows per review
  fields: Vec<FormField>,
  /// Dates of the reviews in the form; not editable, sent back unchanged
  review_dates: Vec<Option<String>>,
  focused: usize,
  categories: QueryHandle<Vec<Category>>,
  save: Request<Product, MutationError>,
  error: Option<String>,
}

impl ProductEditView {
  pub fn new(session: Session, product: Product) -> Self {
    let mut fields = vec![
      FormField::new("Title", FieldKind::Text, &product.title).required(),
      FormField::new("Description", FieldKind::Text, &product.description).required(),
      FormField::new("Price", FieldKind::Number, &product.price.to_string()).required(),
      FormField::new(
        "Discount %",
        FieldKind::Number,
        &product.discount_percentage.to_string(),
      ),
      FormField::new("Rating", FieldKind::Number, &product.rating.to_string()),
      FormField::new("Stock", FieldKind::Number, &product.stock.to_string()),
      FormField::new(
        "Brand",
        FieldKind::Text,
        product.brand.as_deref().unwrap_or(""),
      ),
      FormField::new("Category", FieldKind::Choice(Vec::new()), &product.category).required(),
    ];
    fields.extend(product.reviews.iter().flat_map(review_fields));
    let review_dates = product.reviews.iter().map(|r| r.date.clone()).collect();
    let categories = session
      .categories
      .subscribe(categories_key(&session.collection));

    let mut view = Self {
      session,
      original: product,
      fields,
      review_dates,
      focused: 0,
      categories,
      save: Request::new(),
      error: None,
    };
    view.apply_categories();
    view
  }

  fn apply_categories(&mut self) {
    let snapshot = self.categories.snapshot();
    if let Some(categories) = snapshot.data() {
      let options = categories.iter().map(|c| c.slug.clone()).collect();
      self.fields[CATEGORY].set_options(options);
    }
  }

  fn value(&self, field: usize) -> &str {
    self.fields[field].value().trim()
  }

  fn number(&self, field: usize, name: &'static str) -> Result<f64, ValidationError> {
    self
      .value(field)
      .parse()
      .map_err(|_| ValidationError::new(name, "must be a number"))
  }

  /// Index of the review the focused row belongs to
  fn focused_review(&self) -> Option<usize> {
    self
      .focused
      .checked_sub(PRODUCT_FIELDS)
      .map(|row| row / REVIEW_FIELDS)
  }

  fn add_review(&mut self) {
    let blank = Review {
      rating: 5,
      comment: String::new(),
      reviewer_name: String::new(),
      reviewer_email: String::new(),
      date: None,
    };
    self.fields.extend(review_fields(&blank));
    self.review_dates.push(None);
    self.focused = self.fields.len() - REVIEW_FIELDS;
  }

  fn remove_review(&mut self) {
    let Some(index) = self.focused_review() else {
      return;
    };
    let start = PRODUCT_FIELDS + index * REVIEW_FIELDS;
    self.fields.drain(start..start + REVIEW_FIELDS);
    self.review_dates.remove(index);
    self.focused = start.min(self.fields.len() - 1);
  }

  /// Reviews as currently entered in the form
  fn reviews(&self) -> Result<Vec<Review>, ValidationError> {
    self
      .review_dates
      .iter()
      .enumerate()
      .map(|(i, date)| {
        let row = PRODUCT_FIELDS + i * REVIEW_FIELDS;
        let rating = self.value(row + STARS).parse().map_err(|_| {
          ValidationError::new(format!("reviews[{}].rating", i), "must be a whole number")
        })?;
        Ok(Review {
          rating,
          comment: self.value(row + COMMENT).to_string(),
          reviewer_name: self.value(row + REVIEWER).to_string(),
          reviewer_email: self.value(row + EMAIL).to_string(),
          date: date.clone(),
        })
      })
      .collect()
  }

  /// Patch holding the fields that differ from the product being edited.
  /// Reviews go out as a whole list when any of them changed.
  /// Range and required-field checks are left to the mutation pipeline.
  pub fn build_patch(&self) -> Result<ProductPatch, ValidationError> {
    let original = &self.original;
    let changed_text = |field: usize, current: &str| {
      let value = self.value(field);
      (value != current).then(|| value.to_string())
    };
    let changed_number = |value: f64, current: f64| (value != current).then_some(value);

    let stock: i64 = self
      .value(STOCK)
      .parse()
      .map_err(|_| ValidationError::new("stock", "must be a whole number"))?;
    let reviews = self.reviews()?;

    Ok(ProductPatch {
      title: changed_text(TITLE, &original.title),
      description: changed_text(DESCRIPTION, &original.description),
      price: changed_number(self.number(PRICE, "price")?, original.price),
      discount_percentage: changed_number(
        self.number(DISCOUNT, "discountPercentage")?,
        original.discount_percentage,
      ),
      rating: changed_number(self.number(RATING, "rating")?, original.rating),
      stock: (stock != i64::from(original.stock)).then_some(stock),
      brand: changed_text(BRAND, original.brand.as_deref().unwrap_or("")),
      category: changed_text(CATEGORY, &original.category),
      reviews: (reviews != original.reviews).then_some(reviews),
    })
  }

  fn submit(&mut self) {
    if self.save.is_pending() {
      return;
    }
    match self.build_patch() {
      Ok(patch) => {
        self.error = None;
        let mutations = self.session.mutations.clone();
        let id = self.original.id;
        self
          .save
          .start(async move { mutations.submit(id, patch).await });
      }
      Err(e) => self.error = Some(e.to_string()),
    }
  }

  fn focus(&mut self, forward: bool) {
    let len = self.fields.len();
    self.focused = if forward {
      (self.focused + 1) % len
    } else {
      (self.focused + len - 1) % len
    };
  }

  fn title(&self) -> String {
    let id = self.original.id;
    if !self.save.is_pending() {
      return format!(" Edit #{} ", id);
    }
    match self.session.mutations.pending() {
      Some(pending) if pending.entity_id == id => format!(
        " Edit #{} (saving since {}) ",
        id,
        pending.submitted_at.with_timezone(&Local).format("%H:%M:%S")
      ),
      _ => format!(" Edit #{} (saving...) ", id),
    }
  }

  fn render_form(&self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(self.title())
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    // Scroll so the focused row stays on screen
    let visible = (inner.height as usize)
      .saturating_sub(FOOTER_ROWS)
      .clamp(1, self.fields.len());
    let first = (self.focused + 1).saturating_sub(visible);

    let mut constraints = vec![Constraint::Length(1); visible];
    constraints.push(Constraint::Length(1));
    constraints.push(Constraint::Length(1));
    constraints.push(Constraint::Min(0));
    let rows = Layout::vertical(constraints).split(inner);

    for (row, i) in (first..first + visible).enumerate() {
      self.fields[i].render(frame, rows[row], i == self.focused);
    }

    let message_row = rows[visible + 1];
    if let Some(error) = &self.error {
      frame.render_widget(
        Paragraph::new(error.as_str()).style(Style::default().fg(Color::Red)),
        message_row,
      );
    } else if self.categories.snapshot().is_error() {
      frame.render_widget(
        Paragraph::new("categories unavailable, type one in")
          .style(Style::default().fg(Color::DarkGray)),
        message_row,
      );
    }

    let help = Paragraph::new(
      "tab/↑↓ move  ◀ ▶ choose  ctrl-n add review  ctrl-d drop review  ctrl-s save  esc cancel",
    )
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, rows[visible + 2]);
  }
}

impl View for ProductEditView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
      match key.code {
        KeyCode::Char('s') => self.submit(),
        KeyCode::Char('n') => self.add_review(),
        KeyCode::Char('d') => self.remove_review(),
        _ => {}
      }
      return ViewAction::None;
    }
    match key.code {
      KeyCode::Esc => return ViewAction::Pop,
      KeyCode::Tab | KeyCode::Down | KeyCode::Enter => self.focus(true),
      KeyCode::BackTab | KeyCode::Up => self.focus(false),
      _ => {
        self.fields[self.focused].handle_key(key);
      }
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_form(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    format!("Edit #{}", self.original.id)
  }

  fn context(&self) -> Option<String> {
    Some(self.original.title.clone())
  }

  fn tick(&mut self) -> ViewAction {
    if self.categories.poll().is_some() {
      self.apply_categories();
    }
    if !self.save.poll() {
      return ViewAction::None;
    }
    match self.save.state() {
      RequestState::Success(product) => return ViewAction::Updated(product.clone()),
      RequestState::Failed(error) => {
        self.error = Some(error.to_string());
        self.save.reset();
      }
      RequestState::Idle | RequestState::Pending => {}
    }
    ViewAction::None
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("ctrl-s", "save").with_priority(20),
      ShortcutInfo::new("ctrl-n", "add review").with_priority(40),
      ShortcutInfo::new("ctrl-d", "drop review").with_priority(45),
      ShortcutInfo::new("esc", "cancel").with_priority(90),
    ]
  }
}
