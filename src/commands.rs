//! Available commands and autocomplete logic

use crate::pagination::PaginationMode;

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "paged",
    aliases: &["p", "pages"],
    description: "Browse one page at a time",
  },
  Command {
    name: "all",
    aliases: &["a", "bulk"],
    description: "Load the whole catalog",
  },
  Command {
    name: "scroll",
    aliases: &["s", "infinite"],
    description: "Load more while scrolling",
  },
  Command {
    name: "refresh",
    aliases: &["r", "reload"],
    description: "Refetch the current view",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit shelf",
  },
];

/// Pagination mode selected by a command name, if it selects one
pub fn mode_for(name: &str) -> Option<PaginationMode> {
  match name {
    "paged" => Some(PaginationMode::Paged),
    "all" => Some(PaginationMode::Bulk),
    "scroll" => Some(PaginationMode::Infinite),
    _ => None,
  }
}

/// Get autocomplete suggestions for a given input, best match first
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input = input.trim().to_lowercase();
  if input.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = COMMANDS
    .iter()
    .filter_map(|cmd| match_rank(cmd, &input).map(|rank| (cmd, rank)))
    .collect();
  // Stable sort keeps declaration order within a rank
  matches.sort_by_key(|(_, rank)| *rank);
  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Lower is better: exact name, exact alias, name prefix, alias prefix,
/// name substring, alias substring.
fn match_rank(cmd: &Command, input: &str) -> Option<u32> {
  let alias = |f: &dyn Fn(&str) -> bool| cmd.aliases.iter().any(|a| f(a));
  if cmd.name == input {
    Some(0)
  } else if alias(&|a: &str| a == input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if alias(&|a: &str| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if alias(&|a: &str| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    let suggestions = get_suggestions("");
    assert_eq!(suggestions.len(), COMMANDS.len());
  }

  #[test]
  fn test_exact_match() {
    let suggestions = get_suggestions("scroll");
    assert_eq!(suggestions[0].name, "scroll");
  }

  #[test]
  fn test_alias_beats_prefix() {
    // "a" is an alias of all and a prefix of nothing else
    assert_eq!(get_suggestions("a")[0].name, "all");
    // "r" is an alias of refresh
    assert_eq!(get_suggestions("r")[0].name, "refresh");
  }

  #[test]
  fn test_prefix_match() {
    assert_eq!(get_suggestions("pag")[0].name, "paged");
    assert_eq!(get_suggestions("inf")[0].name, "scroll");
  }

  #[test]
  fn test_fuzzy_match() {
    let suggestions = get_suggestions("roll");
    assert_eq!(suggestions[0].name, "scroll");
  }

  #[test]
  fn test_no_match() {
    assert!(get_suggestions("zzz").is_empty());
  }

  #[test]
  fn test_mode_commands() {
    assert_eq!(mode_for("all"), Some(PaginationMode::Bulk));
    assert_eq!(mode_for("scroll"), Some(PaginationMode::Infinite));
    assert_eq!(mode_for("quit"), None);
  }
}
