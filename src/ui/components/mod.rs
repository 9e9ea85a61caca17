mod command_input;
mod form_field;
mod input;

pub use command_input::{CommandInput, PromptKey};
pub use form_field::{FieldKind, FormField};
pub use input::{InputResult, TextInput};
