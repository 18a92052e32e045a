// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log line formatter for the forwarder.
//!
//! ```text
//! LUMBERJACK | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```
//!
//! The fixed prefix makes forwarder output easy to pick out when it shares a
//! stream with the logs it is shipping.

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::{LookupSpan, Scope, SpanRef};

const PREFIX: &str = "LUMBERJACK";

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "{PREFIX} | {} | ", event.metadata().level())?;

        let spans = ctx.event_scope().into_iter().flat_map(Scope::from_root);
        for span in spans {
            write_span::<S, N>(&mut writer, &span)?;
        }

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Writes `name{fields}: `, or `name: ` for a span recorded without fields.
fn write_span<S, N>(writer: &mut format::Writer<'_>, span: &SpanRef<'_, S>) -> fmt::Result
where
    S: for<'a> LookupSpan<'a>,
    N: 'static,
{
    let extensions = span.extensions();
    match extensions
        .get::<FormattedFields<N>>()
        .filter(|fields| !fields.is_empty())
    {
        Some(fields) => write!(writer, "{}{{{fields}}}: ", span.name()),
        None => write!(writer, "{}: ", span.name()),
    }
}
