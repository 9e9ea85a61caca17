use crate::cache::{CacheConfig, Fetcher, QueryCache};
use crate::catalog::{CatalogClient, Category, Page, Product};
use crate::commands;
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::mutation::{MutationPipeline, ProductUpdater};
use crate::ui;
use crate::ui::components::{CommandInput, PromptKey};
use crate::ui::view::{View, ViewAction};
use crate::ui::views::ProductListView;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tracing::{debug, info};

const TICK_RATE: Duration = Duration::from_millis(100);

/// Caches and the write pipeline shared by every view.
///
/// Cloning is cheap; all clones see the same cache entries.
#[derive(Clone)]
pub struct Session {
  pub collection: String,
  pub pages: QueryCache<Page>,
  pub products: QueryCache<Product>,
  pub categories: QueryCache<Vec<Category>>,
  pub mutations: MutationPipeline,
}

impl Session {
  pub fn new<R>(remote: R, collection: &str, config: CacheConfig) -> Self
  where
    R: Fetcher<Page> + Fetcher<Product> + Fetcher<Vec<Category>> + ProductUpdater + Clone,
  {
    let pages = QueryCache::<Page>::new(remote.clone(), config);
    let products = QueryCache::<Product>::new(remote.clone(), config);
    let categories = QueryCache::<Vec<Category>>::new(remote.clone(), config);
    let mutations = MutationPipeline::new(remote)
      .invalidates(pages.clone())
      .invalidates(products.clone());
    Self {
      collection: collection.to_string(),
      pages,
      products,
      categories,
      mutations,
    }
  }

  /// Evict entries past their grace period. Returns how many were dropped.
  pub fn collect_garbage(&self) -> usize {
    self.pages.collect_garbage()
      + self.products.collect_garbage()
      + self.categories.collect_garbage()
  }

  pub fn clear(&self) {
    self.pages.clear();
    self.products.clear();
    self.categories.clear();
  }
}

/// Main application state
pub struct App {
  config: Config,
  session: Session,
  /// Root of the navigation stack
  list: ProductListView,
  /// Views pushed on top of the list
  stack: Vec<Box<dyn View>>,
  command: CommandInput,
  status: Option<String>,
  should_quit: bool,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let client = CatalogClient::new(&config.remote)?;
    let session = Session::new(client.clone(), client.collection(), config.cache_config());
    Ok(Self::with_session(config, session))
  }

  fn with_session(config: Config, session: Session) -> Self {
    let list = ProductListView::new(
      session.clone(),
      config.pagination.page_size,
      config.pagination.mode,
    );
    Self {
      config,
      session,
      list,
      stack: Vec::new(),
      command: CommandInput::new(),
      status: None,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;

    let result = self.main_loop().await;

    // Restore the terminal before reporting any error
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    self.session.clear();

    result
  }

  async fn main_loop(&mut self) -> Result<()> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    let mut events = EventHandler::new(TICK_RATE);
    info!(
      base_url = %self.config.remote.base_url,
      mode = %self.config.pagination.mode,
      "session started"
    );

    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(Event::Key(key)) => self.handle_key(key),
        Some(Event::Resize) => {}
        Some(Event::Tick) => {
          let evicted = self.session.collect_garbage();
          if evicted > 0 {
            debug!(evicted, "cache entries evicted");
          }
        }
        None => break,
      }
      self.tick();
    }
    Ok(())
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    // The command prompt only opens over the list and detail views; the
    // edit form needs ':' as a character
    if self.command.is_active() || self.accepts_commands() {
      match self.command.handle_key(key) {
        PromptKey::Submitted(cmd) => {
          self.execute_command(&cmd);
          return;
        }
        PromptKey::Consumed | PromptKey::Cancelled => return,
        PromptKey::Ignored => {}
      }
    }

    self.status = None;
    let action = self.current_view_mut().handle_key(key);
    self.apply(action);
  }

  fn accepts_commands(&self) -> bool {
    self
      .current_view()
      .shortcuts()
      .iter()
      .any(|shortcut| shortcut.key == ":")
  }

  fn execute_command(&mut self, cmd: &str) {
    debug!(cmd, "command");
    if let Some(mode) = commands::mode_for(cmd) {
      self.stack.clear();
      self.list.set_mode(mode);
      self.status = Some(format!("{} mode", mode));
      return;
    }
    match cmd {
      "refresh" => self.current_view_mut().refresh(),
      "quit" => self.should_quit = true,
      "" => {}
      other => self.status = Some(format!("Unknown command: {}", other)),
    }
  }

  /// Let every view pick up async results. Only the top view's action is
  /// acted on.
  fn tick(&mut self) {
    self.list.tick();
    let top = self.stack.len();
    let mut action = ViewAction::None;
    for (i, view) in self.stack.iter_mut().enumerate() {
      let result = view.tick();
      if i + 1 == top {
        action = result;
      }
    }
    self.apply(action);
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.stack.push(view),
      ViewAction::Pop => {
        if self.stack.pop().is_none() {
          self.should_quit = true;
        }
      }
      ViewAction::Updated(product) => {
        self.stack.pop();
        self.status = Some(format!("Saved \"{}\"", product.title));
        self.list.on_product_updated(&product);
        for view in self.stack.iter_mut() {
          view.on_product_updated(&product);
        }
      }
    }
  }

  // Accessors for UI rendering
  pub fn current_view(&self) -> &dyn View {
    match self.stack.last() {
      Some(view) => view.as_ref(),
      None => &self.list,
    }
  }

  pub fn current_view_mut(&mut self) -> &mut dyn View {
    match self.stack.last_mut() {
      Some(view) => view.as_mut(),
      None => &mut self.list,
    }
  }

  pub fn command(&self) -> &CommandInput {
    &self.command
  }

  pub fn status(&self) -> Option<&str> {
    self.status.as_deref()
  }

  pub fn base_url(&self) -> &str {
    &self.config.remote.base_url
  }

  pub fn breadcrumb(&self) -> Vec<String> {
    std::iter::once(self.list.breadcrumb_label())
      .chain(self.stack.iter().map(|v| v.breadcrumb_label()))
      .collect()
  }
}
