//! The structured error model.
//!
//! A runtime error carries an arbitrary Lua value (usually a string
//! with a `source:line:` prefix) plus the traceback captured from the
//! frame chain at the point of the raise. `pcall` strips the error back
//! down to its value; the traceback is for uncaught errors surfacing to
//! the host.

use std::fmt;

use crate::value::LuaValue;

pub type LuaResult<T> = Result<T, LuaError>;

/// One frame of a traceback.
#[derive(Clone, Debug)]
pub struct TraceFrame {
    pub source: String,
    pub line: u32,
    /// Function description ("main chunk", "function 'name'", "?").
    pub what: String,
}

#[derive(Clone, Debug, Default)]
pub struct Traceback {
    pub frames: Vec<TraceFrame>,
}

impl fmt::Display for Traceback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stack traceback:")?;
        for frame in &self.frames {
            write!(f, "\n\t{}:{}: in {}", frame.source, frame.line, frame.what)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub enum LuaError {
    /// A raised Lua value, with a rendered message for host display.
    Runtime {
        value: LuaValue,
        message: String,
        traceback: Traceback,
    },
    /// Parse failure; never reaches Lua code except through `load`.
    Syntax { message: String, line: u32 },
}

impl LuaError {
    /// The Lua value `pcall` should hand back.
    pub fn value(&self) -> LuaValue {
        match self {
            LuaError::Runtime { value, .. } => value.clone(),
            LuaError::Syntax { .. } => LuaValue::Nil,
        }
    }

    pub fn message(&self) -> String {
        match self {
            LuaError::Runtime { message, .. } => message.clone(),
            LuaError::Syntax { message, line } => format!("{}: {}", line, message),
        }
    }
}

impl fmt::Display for LuaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaError::Runtime {
                message, traceback, ..
            } => {
                write!(f, "{}", message)?;
                if !traceback.frames.is_empty() {
                    write!(f, "\n{}", traceback)?;
                }
                Ok(())
            }
            LuaError::Syntax { message, line } => {
                write!(f, "syntax error at line {}: {}", line, message)
            }
        }
    }
}

impl std::error::Error for LuaError {}
