use ratatui::prelude::Color;

/// Truncate a string to a maximum number of characters, adding "..." if
/// truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Price with two decimals and a currency sign
pub fn format_price(price: f64) -> String {
  format!("${:.2}", price)
}

/// Display color for a stock level
pub fn stock_color(stock: u32) -> Color {
  match stock {
    0 => Color::Red,
    1..=9 => Color::Yellow,
    _ => Color::Green,
  }
}
