//! Stream binder: opens a stream in the marker's access direction.
//!
//! The converter produces an [`OpenedStream`]. Depending on the parameter
//! type the binder hands out the stream itself or a text/byte view over it:
//!
//! | direction | parameter types                               |
//! |-----------|-----------------------------------------------|
//! | read      | `ReadStream`, `String`, `Vec<u8>`             |
//! | write     | `WriteStream`, `Out<String>`, `Out<Vec<u8>>`  |
//!
//! The stream is always flushed and closed by the completion, whatever way
//! the invocation ends. `Out` contents are written first, on success only.

use std::sync::Arc;

use futures::FutureExt;
use tracing::trace;
use weld_core::{
    BindError, BindResult, BindingKind, BoundValue, FileAccess, Marker, OpenedStream, Out,
    PropertyAccessor, PropertyKind, PropertyValue, ReadStream, TypeKey, WriteStream,
    completion_fn, downcast_value,
};

use crate::binding::{BindingProvider, ParameterBinding, ProviderContext};
use crate::pattern::PatternMatcher;

/// Name of the marker property that overrides the rule's default direction.
pub const ACCESS_PROPERTY: &str = "access";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamTarget {
    Reader,
    Text,
    Bytes,
    Writer,
    OutText,
    OutBytes,
}

impl StreamTarget {
    fn for_type(requested: &TypeKey) -> Option<Self> {
        if requested.is::<ReadStream>() {
            Some(Self::Reader)
        } else if requested.is::<String>() {
            Some(Self::Text)
        } else if requested.is::<Vec<u8>>() {
            Some(Self::Bytes)
        } else if requested.is::<WriteStream>() {
            Some(Self::Writer)
        } else if requested.is::<Out<String>>() {
            Some(Self::OutText)
        } else if requested.is::<Out<Vec<u8>>>() {
            Some(Self::OutBytes)
        } else {
            None
        }
    }

    fn required(self) -> FileAccess {
        match self {
            Self::Reader | Self::Text | Self::Bytes => FileAccess::Read,
            Self::Writer | Self::OutText | Self::OutBytes => FileAccess::Write,
        }
    }
}

/// Binds streams produced by a converter of [`OpenedStream`].
pub struct StreamBinder<M> {
    matcher: PatternMatcher<M>,
    default_access: FileAccess,
    access_property: Option<PropertyAccessor<M>>,
}

impl<M: Marker> StreamBinder<M> {
    /// Wraps a stream converter.
    ///
    /// If the marker exposes an `access` property of type [`FileAccess`], its
    /// value overrides `default_access`.
    pub fn new(matcher: PatternMatcher<M>, default_access: FileAccess) -> Self {
        let access_property = M::property(ACCESS_PROPERTY).filter(|p| {
            p.shape().kind == PropertyKind::Enum(TypeKey::of::<FileAccess>())
        });
        Self {
            matcher,
            default_access,
            access_property,
        }
    }

    /// Returns the direction a given marker instance asks for.
    pub fn access_for(&self, marker: &M) -> FileAccess {
        self.access_property
            .and_then(|p| p.get(marker))
            .and_then(|value| match value {
                PropertyValue::Enum(e) if e.type_key.is::<FileAccess>() => {
                    FileAccess::from_variant(e.variant)
                }
                _ => None,
            })
            .unwrap_or(self.default_access)
    }
}

impl<M: Marker> BindingProvider<M> for StreamBinder<M> {
    fn try_create(&self, ctx: &ProviderContext<'_, M>) -> BindResult<Option<ParameterBinding>> {
        let requested = ctx.param_type();
        let Some(target) = StreamTarget::for_type(&requested) else {
            return Ok(None);
        };

        let access = self.access_for(ctx.marker());
        let required = target.required();
        if !access.permits(required) {
            trace!(
                marker = M::NAME,
                requested = %requested,
                access = %access,
                "Stream binder declined: direction not permitted"
            );
            return Ok(None);
        }

        let matcher = self.matcher.clone();
        let marker = Arc::clone(ctx.marker());
        let descriptor = ctx
            .descriptor(BindingKind::Stream)
            .with_hint("access", required.as_str());

        Ok(Some(ParameterBinding::new(
            BindingKind::Stream,
            descriptor,
            move |rctx| {
                let opening = matcher.convert(
                    Arc::clone(&marker),
                    TypeKey::of::<OpenedStream>(),
                    rctx.with_access(required),
                );
                async move {
                    let opened = downcast_value::<OpenedStream>(opening.await?, "opened stream")?;
                    bind_stream(target, opened).await
                }
            },
        )))
    }

    fn kind(&self) -> BindingKind {
        BindingKind::Stream
    }

    fn describe(&self) -> String {
        let source = if self.access_property.is_some() {
            "marker access, default"
        } else {
            "access"
        };
        format!(
            "stream [{}] ({source} {})",
            self.matcher.description(),
            self.default_access
        )
    }
}

async fn bind_stream(target: StreamTarget, opened: OpenedStream) -> BindResult<BoundValue> {
    match (target, opened) {
        (StreamTarget::Reader, OpenedStream::Read(reader)) => {
            let stream = ReadStream::new(reader);
            let closing = stream.clone();
            Ok(BoundValue::new(stream).with_completion(completion_fn(move |_| {
                async move {
                    closing.close().await;
                    Ok(())
                }
                .boxed()
            })))
        }
        (StreamTarget::Text, OpenedStream::Read(reader)) => {
            let stream = ReadStream::new(reader);
            let text = stream.read_to_string().await;
            stream.close().await;
            Ok(BoundValue::new(text?))
        }
        (StreamTarget::Bytes, OpenedStream::Read(reader)) => {
            let stream = ReadStream::new(reader);
            let bytes = stream.read_to_end().await;
            stream.close().await;
            Ok(BoundValue::new(bytes?))
        }
        (StreamTarget::Writer, OpenedStream::Write(writer)) => {
            let stream = WriteStream::new(writer);
            let closing = stream.clone();
            Ok(BoundValue::new(stream).with_completion(completion_fn(move |_| {
                async move { closing.close().await.map_err(BindError::from) }.boxed()
            })))
        }
        (StreamTarget::OutText, OpenedStream::Write(writer)) => {
            Ok(bind_out(WriteStream::new(writer), String::into_bytes))
        }
        (StreamTarget::OutBytes, OpenedStream::Write(writer)) => {
            Ok(bind_out(WriteStream::new(writer), |bytes: Vec<u8>| bytes))
        }
        (target, opened) => Err(BindError::AccessDenied {
            opened: opened.access().as_str(),
            required: target.required().as_str(),
        }),
    }
}

/// Binds an `Out<T>` whose contents are written to `stream` on success.
fn bind_out<T, F>(stream: WriteStream, encode: F) -> BoundValue
where
    T: Send + 'static,
    F: FnOnce(T) -> Vec<u8> + Send + 'static,
{
    let out = Out::<T>::new();
    let slot = out.clone();
    BoundValue::new(out).with_completion(completion_fn(move |status| {
        async move {
            let written = match slot.take() {
                Some(value) if status.is_success() => {
                    stream.write_all(&encode(value)).await.map_err(BindError::from)
                }
                _ => Ok(()),
            };
            let closed = stream.close().await.map_err(BindError::from);
            written.and(closed)
        }
        .boxed()
    }))
}
