use std::fmt;

/// A key/value pair attached to a log line.
pub type Field<'a> = (&'a str, &'a dyn fmt::Display);

/// Sink for the elector's log lines.
///
/// The elector never logs through anything else, so an application can route
/// its messages wherever it wants.
pub trait Logger: Send + Sync {
    fn info(&self, msg: &str, fields: &[Field<'_>]);
    fn debug(&self, msg: &str, fields: &[Field<'_>]);
    fn error(&self, msg: &str, fields: &[Field<'_>]);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn info(&self, _msg: &str, _fields: &[Field<'_>]) {}
    fn debug(&self, _msg: &str, _fields: &[Field<'_>]) {}
    fn error(&self, _msg: &str, _fields: &[Field<'_>]) {}
}

/// Forwards to `tracing` events.
///
/// Without an installed subscriber this is as quiet as [`NoopLogger`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

struct Fields<'a>(&'a [Field<'a>]);

impl fmt::Display for Fields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

macro_rules! forward {
    ($level:ident, $msg:expr, $fields:expr) => {
        if $fields.is_empty() {
            tracing::$level!("{}", $msg);
        } else {
            tracing::$level!(fields = %Fields($fields), "{}", $msg);
        }
    };
}

impl Logger for TracingLogger {
    fn info(&self, msg: &str, fields: &[Field<'_>]) {
        forward!(info, msg, fields);
    }

    fn debug(&self, msg: &str, fields: &[Field<'_>]) {
        forward!(debug, msg, fields);
    }

    fn error(&self, msg: &str, fields: &[Field<'_>]) {
        forward!(error, msg, fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_render_as_pairs() {
        let attempts = 3;
        let fields: &[Field<'_>] = &[("topic", &"billing"), ("attempts", &attempts)];
        assert_eq!(Fields(fields).to_string(), "topic=billing attempts=3");
    }

    #[test]
    fn test_empty_fields_render_nothing() {
        assert_eq!(Fields(&[]).to_string(), "");
    }
}
