//! Text parsers attached to class infos.

use std::any::Any;

use crate::log::ParseLog;
use crate::runtime::Value;

/// Where the text being parsed comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseContext {
    /// Literals inside a script expression.
    Default,
    /// Event values of a script trigger.
    Event,
    /// Command arguments typed by a player.
    Command,
    /// Values of configuration entries.
    Config,
    /// Script-level text such as options.
    Script,
}

/// How a value is turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringMode {
    Message,
    Debug,
    VariableName,
    Command,
}

/// Parses text into values of one type and renders values of that type.
pub trait Parser: Send + Sync {
    /// Parse `input`, or return `None` and optionally explain why in `log`.
    fn parse(&self, input: &str, context: ParseContext, log: &mut ParseLog) -> Option<Value>;

    fn can_parse(&self, _context: ParseContext) -> bool {
        true
    }

    fn to_string(&self, value: &Value, flags: u32) -> String;

    /// Text used when the value is part of a variable name.
    fn to_variable_name_string(&self, value: &Value) -> String;

    fn debug_message(&self, value: &Value) -> String {
        self.to_string(value, 0)
    }

    /// Render according to `mode`. Command mode renders like message mode.
    fn to_string_mode(&self, value: &Value, mode: StringMode, flags: u32) -> String {
        match mode {
            StringMode::Message | StringMode::Command => self.to_string(value, flags),
            StringMode::Debug => self.debug_message(value),
            StringMode::VariableName => self.to_variable_name_string(value),
        }
    }
}

type ParseFn<T> = Box<dyn Fn(&str, ParseContext, &mut ParseLog) -> Option<T> + Send + Sync>;
type RenderFn<T> = Box<dyn Fn(&T) -> String + Send + Sync>;

/// A [`Parser`] for `T` built from closures.
///
/// ```
/// use skript_types::{FnParser, ParseContext, ParseLog, Parser};
///
/// let parser = FnParser::new(|s, _| s.parse::<u8>().ok(), |n: &u8| n.to_string());
/// let value = parser.parse("7", ParseContext::Default, &mut ParseLog::new()).unwrap();
/// assert_eq!(parser.to_string(&value, 0), "7");
/// ```
pub struct FnParser<T> {
    parse: ParseFn<T>,
    render: RenderFn<T>,
    variable_name: Option<RenderFn<T>>,
    debug: Option<RenderFn<T>>,
    contexts: Option<Vec<ParseContext>>,
}

impl<T: Any + Send + Sync> FnParser<T> {
    pub fn new(
        parse: impl Fn(&str, ParseContext) -> Option<T> + Send + Sync + 'static,
        render: impl Fn(&T) -> String + Send + Sync + 'static,
    ) -> Self {
        Self::with_log(move |input, context, _| parse(input, context), render)
    }

    /// Like [`new`](Self::new) but the parse function may report errors.
    pub fn with_log(
        parse: impl Fn(&str, ParseContext, &mut ParseLog) -> Option<T> + Send + Sync + 'static,
        render: impl Fn(&T) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            parse: Box::new(parse),
            render: Box::new(render),
            variable_name: None,
            debug: None,
            contexts: None,
        }
    }

    /// A parser that only renders. It never parses text.
    pub fn render_only(render: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        Self::new(|_, _| None, render).only_in(&[])
    }

    #[must_use]
    pub fn variable_name(mut self, render: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        self.variable_name = Some(Box::new(render));
        self
    }

    #[must_use]
    pub fn debug(mut self, render: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        self.debug = Some(Box::new(render));
        self
    }

    /// Restrict parsing to the given contexts.
    #[must_use]
    pub fn only_in(mut self, contexts: &[ParseContext]) -> Self {
        self.contexts = Some(contexts.to_vec());
        self
    }

    fn render_with(&self, render: Option<&RenderFn<T>>, value: &Value) -> String {
        match value.downcast_ref::<T>() {
            Some(value) => render.unwrap_or(&self.render)(value),
            None => format!("{value:?}"),
        }
    }
}

impl<T: Any + Send + Sync> Parser for FnParser<T> {
    fn parse(&self, input: &str, context: ParseContext, log: &mut ParseLog) -> Option<Value> {
        (self.parse)(input, context, log).map(Value::new)
    }

    fn can_parse(&self, context: ParseContext) -> bool {
        self.contexts.as_ref().is_none_or(|contexts| contexts.contains(&context))
    }

    fn to_string(&self, value: &Value, _flags: u32) -> String {
        self.render_with(None, value)
    }

    fn to_variable_name_string(&self, value: &Value) -> String {
        self.render_with(self.variable_name.as_ref(), value)
    }

    fn debug_message(&self, value: &Value) -> String {
        self.render_with(self.debug.as_ref(), value)
    }
}
