use crate::app::Session;
use crate::catalog::Product;
use crate::pagination::{PaginationCoordinator, PaginationMode};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{format_price, stock_color, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{ProductDetailView, ProductEditView};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

/// Rows from the bottom of the list at which scrolling asks for more
const LOAD_MORE_THRESHOLD: usize = 3;

/// Root view: the product collection in one of the pagination modes
pub struct ProductListView {
  session: Session,
  coordinator: PaginationCoordinator,
  list_state: ListState,
}

impl ProductListView {
  pub fn new(session: Session, page_size: u64, mode: PaginationMode) -> Self {
    let coordinator = PaginationCoordinator::new(
      session.pages.clone(),
      &session.collection,
      page_size,
      mode,
    );
    Self {
      session,
      coordinator,
      list_state: ListState::default(),
    }
  }

  pub fn mode(&self) -> PaginationMode {
    self.coordinator.mode()
  }

  pub fn set_mode(&mut self, mode: PaginationMode) {
    self.coordinator.set_mode(mode);
    self.list_state.select(Some(0));
  }

  fn products(&self) -> &[Product] {
    &self.coordinator.projection().items
  }

  fn selected_product(&self) -> Option<&Product> {
    self
      .list_state
      .selected()
      .and_then(|idx| self.products().get(idx))
  }

  /// In infinite mode, request the next page once the selection gets close
  /// to the end of what is loaded
  fn maybe_load_more(&mut self) {
    if self.coordinator.mode() != PaginationMode::Infinite {
      return;
    }
    let len = self.products().len();
    let selected = self.list_state.selected().unwrap_or(0);
    if len == 0 || selected + LOAD_MORE_THRESHOLD >= len {
      self.coordinator.near_end_of_list();
    }
  }

  fn change_page(&mut self, forward: bool) {
    let before = self.coordinator.current_page();
    if forward {
      self.coordinator.next_page();
    } else {
      self.coordinator.prev_page();
    }
    if self.coordinator.current_page() != before {
      self.list_state.select(Some(0));
    }
  }

  fn title(&self) -> String {
    let projection = self.coordinator.projection();
    let status = if let Some(error) = &projection.error {
      format!("error: {}", error)
    } else if projection.is_loading {
      "loading...".to_string()
    } else {
      format!("{} of {}", projection.items.len(), projection.total)
    };
    format!(" Products [{}] ({}) ", self.coordinator.mode(), status)
  }

  fn footer_line(&self) -> Option<Line<'static>> {
    let projection = self.coordinator.projection();
    let text = match self.coordinator.mode() {
      PaginationMode::Paged => {
        let page = self.coordinator.current_page().unwrap_or(1);
        let count = self
          .coordinator
          .page_count()
          .map_or_else(|| "?".to_string(), |c| c.to_string());
        format!(" page {}/{}  n:next  p:prev ", page, count)
      }
      PaginationMode::Bulk => return None,
      PaginationMode::Infinite if self.coordinator.is_exhausted() => {
        format!(" all {} loaded ", projection.items.len())
      }
      PaginationMode::Infinite if projection.is_loading => " loading more... ".to_string(),
      PaginationMode::Infinite if projection.error.is_some() => {
        " load failed, scroll to retry ".to_string()
      }
      PaginationMode::Infinite => return None,
    };
    Some(Line::styled(text, Style::default().fg(Color::DarkGray)))
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.products().len();
    ensure_valid_selection(&mut self.list_state, len);

    let mut block = Block::default()
      .title(self.title())
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    if let Some(footer) = self.footer_line() {
      block = block.title_bottom(footer.right_aligned());
    }

    let projection = self.coordinator.projection();
    if projection.items.is_empty() {
      let content = if projection.is_loading {
        "Loading products...".to_string()
      } else if let Some(error) = &projection.error {
        format!("Failed to load products: {}. Press 'r' to retry.", error)
      } else {
        "No products found.".to_string()
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = projection
      .items
      .iter()
      .map(|product| {
        let line = Line::from(vec![
          Span::styled(format!("{:<5}", product.id), Style::default().fg(Color::DarkGray)),
          Span::raw(format!("{:<36}", truncate(&product.title, 34))),
          Span::styled(
            format!("{:>10}", format_price(product.price)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw("  "),
          Span::styled(
            format!("{:<18}", truncate(&product.category, 18)),
            Style::default().fg(Color::Magenta),
          ),
          Span::raw(format!(
            "{:<16}",
            truncate(product.brand.as_deref().unwrap_or("-"), 16)
          )),
          Span::styled(
            format!("★ {:<6.2}", product.rating),
            Style::default().fg(Color::Yellow),
          ),
          Span::styled(
            format!("{:>5}", product.stock),
            Style::default().fg(stock_color(product.stock)),
          ),
        ]);
        ListItem::new(line)
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for ProductListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => {
        self.list_state.select_next();
        self.maybe_load_more();
      }
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('g') | KeyCode::Home => self.list_state.select_first(),
      KeyCode::Char('G') | KeyCode::End => {
        let len = self.products().len();
        if len > 0 {
          self.list_state.select(Some(len - 1));
        }
        self.maybe_load_more();
      }
      KeyCode::Char('n') | KeyCode::Right | KeyCode::PageDown => self.change_page(true),
      KeyCode::Char('p') | KeyCode::Left | KeyCode::PageUp => self.change_page(false),
      KeyCode::Char('r') => self.refresh(),
      KeyCode::Enter => {
        if let Some(product) = self.selected_product() {
          return ViewAction::Push(Box::new(ProductDetailView::new(
            self.session.clone(),
            product.id,
          )));
        }
      }
      KeyCode::Char('e') => {
        if let Some(product) = self.selected_product() {
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
    self.render_list(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Products".to_string()
  }

  fn context(&self) -> Option<String> {
    let projection = self.coordinator.projection();
    let context = match self.coordinator.mode() {
      PaginationMode::Paged => format!(
        "Paged {}/{}",
        self.coordinator.current_page().unwrap_or(1),
        self
          .coordinator
          .page_count()
          .map_or_else(|| "?".to_string(), |c| c.to_string())
      ),
      PaginationMode::Bulk => format!("All {}", projection.items.len()),
      PaginationMode::Infinite => {
        format!("Scroll {}/{}", projection.items.len(), projection.total)
      }
    };
    Some(context)
  }

  fn tick(&mut self) -> ViewAction {
    if self.coordinator.poll() {
      let len = self.products().len();
      ensure_valid_selection(&mut self.list_state, len);
    }
    // An empty scroll list has nothing to scroll through, so load the first
    // page without waiting for a key. Errors wait for the user.
    let projection = self.coordinator.projection();
    if self.coordinator.mode() == PaginationMode::Infinite
      && projection.items.is_empty()
      && !projection.is_loading
      && projection.error.is_none()
      && !self.coordinator.is_exhausted()
    {
      self.coordinator.near_end_of_list();
    }
    ViewAction::None
  }

  fn refresh(&mut self) {
    self.coordinator.refresh();
  }

  fn on_product_updated(&mut self, product: &Product) {
    self.coordinator.replace_entity(product);
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    let mut shortcuts = vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("enter", "details").with_priority(20),
      ShortcutInfo::new("e", "edit").with_priority(30),
      ShortcutInfo::new("r", "refresh").with_priority(50),
    ];
    if self.coordinator.mode() == PaginationMode::Paged {
      shortcuts.push(ShortcutInfo::new("n/p", "page").with_priority(40));
    }
    shortcuts
  }
}
