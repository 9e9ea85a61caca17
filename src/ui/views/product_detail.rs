use crate::app::Session;
use crate::cache::{QueryHandle, QuerySnapshot};
use crate::catalog::{product_key, Product, ProductId};
use crate::ui::renderfns::{format_price, stock_color};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::ProductEditView;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// View for displaying a single product
pub struct ProductDetailView {
  session: Session,
  id: ProductId,
  handle: QueryHandle<Product>,
  snapshot: QuerySnapshot<Product>,
  scroll: u16,
}

impl ProductDetailView {
  pub fn new(session: Session, id: ProductId) -> Self {
    let handle = session
      .products
      .subscribe(product_key(&session.collection, id));
    let snapshot = handle.snapshot();
    Self {
      session,
      id,
      handle,
      snapshot,
      scroll: 0,
    }
  }

  fn field<'a>(label: &'a str, value: impl Into<Span<'a>>) -> Line<'a> {
    Line::from(vec![
      Span::styled(format!("{:<14}", label), Style::default().fg(Color::DarkGray)),
      value.into(),
    ])
  }

  fn lines(product: &Product) -> Vec<Line<'_>> {
    let mut lines = vec![
      Line::styled(product.title.as_str(), Style::default().bold()),
      Line::default(),
      Self::field(
        "Price",
        Span::styled(format_price(product.price), Style::default().fg(Color::Cyan)),
      ),
      Self::field("Discount", format!("{:.2}%", product.discount_percentage)),
      Self::field("Category", product.category.as_str()),
      Self::field("Brand", product.brand.as_deref().unwrap_or("-")),
      Self::field(
        "Stock",
        Span::styled(
          product.stock.to_string(),
          Style::default().fg(stock_color(product.stock)),
        ),
      ),
      Self::field(
        "Rating",
        Span::styled(format!("★ {:.2}", product.rating), Style::default().fg(Color::Yellow)),
      ),
    ];
    if let Some(status) = &product.availability_status {
      lines.push(Self::field("Availability", status.as_str()));
    }
    if let Some(sku) = &product.sku {
      lines.push(Self::field("SKU", sku.as_str()));
    }
    if !product.tags.is_empty() {
      lines.push(Self::field("Tags", product.tags.join(", ")));
    }
    if let Some(d) = &product.dimensions {
      lines.push(Self::field(
        "Dimensions",
        format!("{} × {} × {}", d.width, d.height, d.depth),
      ));
    }
    if let Some(weight) = product.weight {
      lines.push(Self::field("Weight", weight.to_string()));
    }
    if let Some(warranty) = &product.warranty_information {
      lines.push(Self::field("Warranty", warranty.as_str()));
    }
    if let Some(shipping) = &product.shipping_information {
      lines.push(Self::field("Shipping", shipping.as_str()));
    }

    lines.push(Line::default());
    lines.push(Line::from(product.description.as_str()));

    if !product.reviews.is_empty() {
      lines.push(Line::default());
      lines.push(Line::styled(
        format!("Reviews ({})", product.reviews.len()),
        Style::default().fg(Color::Blue).bold(),
      ));
      for review in &product.reviews {
        lines.push(Line::from(vec![
          Span::styled(
            format!("{:<5}", "★".repeat(review.rating as usize)),
            Style::default().fg(Color::Yellow),
          ),
          Span::raw(" "),
          Span::styled(review.reviewer_name.as_str(), Style::default().fg(Color::Cyan)),
          Span::raw(": "),
          Span::raw(review.comment.as_str()),
        ]));
      }
    }
    lines
  }

  fn render_detail(&self, frame: &mut Frame, area: Rect) {
    let title = if self.snapshot.is_loading() {
      format!(" Product #{} (loading...) ", self.id)
    } else {
      format!(" Product #{} ", self.id)
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(product) = self.snapshot.data() else {
      let (content, color) = match self.snapshot.error() {
        Some(error) => (
          format!("Error: {}\n\nPress 'r' to retry.", error),
          Color::Red,
        ),
        None => ("Loading product...".to_string(), Color::DarkGray),
      };
      frame.render_widget(
        Paragraph::new(content).style(Style::default().fg(color)),
        inner,
      );
      return;
    };

    let [body, status] =
      Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(inner);
    let paragraph = Paragraph::new(Self::lines(product))
      .wrap(Wrap { trim: false })
      .scroll((self.scroll, 0));
    frame.render_widget(paragraph, body);

    // Stale data stays visible while a refetch fails
    if let Some(error) = self.snapshot.error() {
      frame.render_widget(
        Paragraph::new(format!("refresh failed: {}", error)).style(Style::default().fg(Color::Red)),
        status,
      );
    }
  }
}

impl View for ProductDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.scroll = self.scroll.saturating_add(1),
      KeyCode::Char('k') | KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
      KeyCode::Char('r') => self.refresh(),
      KeyCode::Char('e') => {
        if let Some(product) = self.snapshot.data() {
          return ViewAction::Push(Box::new(ProductEditView::new(
            self.session.clone(),
            product.clone(),
          )));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_detail(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    format!("#{}", self.id)
  }

  fn context(&self) -> Option<String> {
    self.snapshot.data().map(|p| p.title.clone())
  }

  fn tick(&mut self) -> ViewAction {
    if let Some(snapshot) = self.handle.poll() {
      self.snapshot = snapshot;
    }
    ViewAction::None
  }

  fn refresh(&mut self) {
    self.session.products.invalidate_key(self.handle.key());
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("e", "edit").with_priority(20),
      ShortcutInfo::new("r", "refresh").with_priority(50),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheConfig;
  use crate::catalog::fake::FakeCatalog;
  use crossterm::event::KeyModifiers;
  use std::time::Duration;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  async fn settle(view: &mut ProductDetailView) {
    for _ in 0..20 {
      tokio::time::sleep(Duration::from_millis(1)).await;
      view.tick();
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_loads_product_and_refreshes() {
    let fake = FakeCatalog::with_products(5);
    let session = Session::new(fake.clone(), fake.collection(), CacheConfig::default());
    let mut view = ProductDetailView::new(session, 4);
    assert!(view.snapshot.is_loading());

    settle(&mut view).await;
    assert_eq!(view.snapshot.data().map(|p| p.id), Some(4));
    assert_eq!(view.context().as_deref(), Some("Product 4"));

    let key4 = product_key(fake.collection(), 4);
    view.handle_key(key(KeyCode::Char('r')));
    settle(&mut view).await;
    assert_eq!(fake.calls(&key4), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_missing_product_shows_error() {
    let fake = FakeCatalog::with_products(5);
    let session = Session::new(fake.clone(), fake.collection(), CacheConfig::default());
    let mut view = ProductDetailView::new(session, 99);
    settle(&mut view).await;

    assert!(view.snapshot.data().is_none());
    assert_eq!(view.snapshot.error().and_then(|e| e.status()), Some(404));
    // Nothing to edit
    assert!(matches!(
      view.handle_key(key(KeyCode::Char('e'))),
      ViewAction::None
    ));
  }
}
