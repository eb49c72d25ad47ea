//! The layer framework.
//!
//! A protocol stack is an arena of boxed layers addressed by small integer
//! handles. `chain` wires the `previous`/`next` links once, `attach` adds
//! demultiplexing routes below a layer. Dispatch is queue-driven: a layer
//! never calls into another layer directly, it pushes actions that the stack
//! drains, so arena slots are only ever borrowed one at a time.
//!
//! Parsed PDUs surface as [`MitmEvent`]s; bytes leaving the bottom of the
//! stack surface as transport writes. Both are collected per drive and handed
//! back to the orchestrator, which plays the role of every layer's observer.

use std::collections::VecDeque;

use crate::secure::SideShared;
use crate::stacks::MitmEvent;
use crate::{SessionError, SessionResult};

pub type LayerHandle = usize;

/// A node in a protocol stack.
///
/// `recv` parses bytes arriving from the previous layer and forwards the
/// inner payload upward; `send` wraps a payload from the next layer and
/// forwards it downward.
pub trait Layer: Send {
    fn name(&self) -> &'static str;

    fn recv(&mut self, ctx: &mut LayerContext<'_>, bytes: &[u8]) -> SessionResult<()>;

    fn send(&mut self, ctx: &mut LayerContext<'_>, payload: &[u8]) -> SessionResult<()>;
}

enum Action {
    Recv { to: LayerHandle, bytes: Vec<u8> },
    Send { to: Option<LayerHandle>, bytes: Vec<u8> },
}

/// Everything a layer may produce during one drive of the stack.
#[derive(Debug, Default)]
pub struct StackOutput {
    /// Bytes that left the bottom of the stack, in order.
    pub transport: Vec<Vec<u8>>,
    /// Parsed PDUs, in order.
    pub events: Vec<MitmEvent>,
}

/// The view of the stack a layer gets while handling traffic.
pub struct LayerContext<'a> {
    prev: Option<LayerHandle>,
    next: Option<LayerHandle>,
    routes: &'a [(LayerHandle, u8, LayerHandle)],
    handle: LayerHandle,
    queue: &'a mut VecDeque<Action>,
    output: &'a mut StackOutput,
    pub shared: &'a mut SideShared,
}

impl LayerContext<'_> {
    /// Whether a next layer exists above this one.
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// Hands `bytes` to the next layer up.
    pub fn forward_up(&mut self, bytes: Vec<u8>) -> SessionResult<()> {
        let Some(next) = self.next else {
            return Err(SessionError::Protocol("layer has no next layer to forward to"));
        };

        self.queue.push_back(Action::Recv { to: next, bytes });
        Ok(())
    }

    /// Hands `bytes` to the layer attached under the given discriminator.
    pub fn forward_route(&mut self, tag: u8, bytes: Vec<u8>) -> SessionResult<()> {
        let route = self
            .routes
            .iter()
            .find(|(parent, route_tag, _)| *parent == self.handle && *route_tag == tag)
            .map(|(_, _, child)| *child);

        let Some(to) = route else {
            return Err(SessionError::Protocol("no layer attached for discriminator"));
        };

        self.queue.push_back(Action::Recv { to, bytes });
        Ok(())
    }

    /// Hands `bytes` to the previous layer's `send`, or to the transport when
    /// this is the bottom layer.
    pub fn send_down(&mut self, bytes: Vec<u8>) {
        self.queue.push_back(Action::Send {
            to: self.prev,
            bytes,
        });
    }

    /// Notifies the stack's observer.
    pub fn emit(&mut self, event: MitmEvent) {
        self.output.events.push(event);
    }
}

/// An arena of layers forming one side's protocol stack.
pub struct LayerStack {
    layers: Vec<Option<Box<dyn Layer>>>,
    prev: Vec<Option<LayerHandle>>,
    next: Vec<Option<LayerHandle>>,
    routes: Vec<(LayerHandle, u8, LayerHandle)>,
    bottom: Option<LayerHandle>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            prev: Vec::new(),
            next: Vec::new(),
            routes: Vec::new(),
            bottom: None,
        }
    }

    pub fn add_layer<L: Layer + 'static>(&mut self, layer: L) -> LayerHandle {
        let handle = self.layers.len();
        self.layers.push(Some(Box::new(layer)));
        self.prev.push(None);
        self.next.push(None);
        handle
    }

    /// Wires `previous`/`next` between consecutive handles. The first handle
    /// of the first chain becomes the bottom of the stack. Called at stack
    /// construction only.
    pub fn chain(&mut self, handles: &[LayerHandle]) {
        for pair in handles.windows(2) {
            debug_assert!(self.next[pair[0]].is_none(), "next is set exactly once");
            self.next[pair[0]] = Some(pair[1]);
            self.prev[pair[1]] = Some(pair[0]);
        }

        if self.bottom.is_none() {
            self.bottom = handles.first().copied();
        }
    }

    /// Routes bytes with the given discriminator from `parent` to `child`,
    /// and makes `parent` the downward path of `child`.
    pub fn attach(&mut self, parent: LayerHandle, tag: u8, child: LayerHandle) {
        self.routes.push((parent, tag, child));
        self.prev[child] = Some(parent);
    }

    /// Feeds transport bytes into the bottom layer.
    pub fn recv(&mut self, shared: &mut SideShared, bytes: &[u8]) -> SessionResult<StackOutput> {
        let Some(bottom) = self.bottom else {
            return Err(SessionError::Protocol("empty layer stack"));
        };

        self.drive(
            shared,
            Action::Recv {
                to: bottom,
                bytes: bytes.to_vec(),
            },
        )
    }

    /// Sends a payload downward starting at the given layer (the layer wraps
    /// the payload with its own header).
    pub fn send_from(&mut self, shared: &mut SideShared, from: LayerHandle, payload: &[u8]) -> SessionResult<StackOutput> {
        self.drive(
            shared,
            Action::Send {
                to: Some(from),
                bytes: payload.to_vec(),
            },
        )
    }

    fn drive(&mut self, shared: &mut SideShared, first: Action) -> SessionResult<StackOutput> {
        let mut queue = VecDeque::new();
        queue.push_back(first);

        let mut output = StackOutput::default();

        while let Some(action) = queue.pop_front() {
            match action {
                Action::Recv { to, bytes } => {
                    let mut layer = self.layers[to]
                        .take()
                        .ok_or(SessionError::Protocol("layer re-entered"))?;

                    let mut ctx = LayerContext {
                        prev: self.prev[to],
                        next: self.next[to],
                        routes: &self.routes,
                        handle: to,
                        queue: &mut queue,
                        output: &mut output,
                        shared: &mut *shared,
                    };

                    let result = layer.recv(&mut ctx, &bytes);
                    self.layers[to] = Some(layer);
                    result?;
                }
                Action::Send { to: Some(to), bytes } => {
                    let mut layer = self.layers[to]
                        .take()
                        .ok_or(SessionError::Protocol("layer re-entered"))?;

                    let mut ctx = LayerContext {
                        prev: self.prev[to],
                        next: self.next[to],
                        routes: &self.routes,
                        handle: to,
                        queue: &mut queue,
                        output: &mut output,
                        shared: &mut *shared,
                    };

                    let result = layer.send(&mut ctx, &bytes);
                    self.layers[to] = Some(layer);
                    result?;
                }
                Action::Send { to: None, bytes } => {
                    output.transport.push(bytes);
                }
            }
        }

        Ok(output)
    }
}

impl Default for LayerStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secure::{SecuritySettings, SecurityMode};
    use crate::Side;

    /// Forwards everything untouched in both directions.
    struct Passthrough;

    impl Layer for Passthrough {
        fn name(&self) -> &'static str {
            "passthrough"
        }

        fn recv(&mut self, ctx: &mut LayerContext<'_>, bytes: &[u8]) -> SessionResult<()> {
            if ctx.has_next() {
                ctx.forward_up(bytes.to_vec())
            } else {
                ctx.emit(MitmEvent::ChannelData {
                    initiator_id: 0,
                    channel_id: 0,
                    data: bytes.to_vec(),
                });
                Ok(())
            }
        }

        fn send(&mut self, ctx: &mut LayerContext<'_>, payload: &[u8]) -> SessionResult<()> {
            ctx.send_down(payload.to_vec());
            Ok(())
        }
    }

    fn shared() -> SideShared {
        SideShared {
            side: Side::Front,
            security: SecuritySettings::new(SecurityMode::Server),
        }
    }

    #[test]
    fn chained_passthrough_layers_are_transparent() {
        let mut stack = LayerStack::new();
        let a = stack.add_layer(Passthrough);
        let b = stack.add_layer(Passthrough);
        let c = stack.add_layer(Passthrough);
        stack.chain(&[a, b, c]);

        let mut shared = shared();

        // Upward: bytes fed at the bottom come out as an event at the top.
        let output = stack.recv(&mut shared, b"some payload").unwrap();
        assert_eq!(output.transport.len(), 0);
        assert_eq!(output.events.len(), 1);
        match &output.events[0] {
            MitmEvent::ChannelData { data, .. } => assert_eq!(data, b"some payload"),
            other => panic!("unexpected event: {other:?}"),
        }

        // Downward: a send from the top comes out of the transport untouched.
        let output = stack.send_from(&mut shared, c, b"some payload").unwrap();
        assert_eq!(output.events.len(), 0);
        assert_eq!(output.transport, vec![b"some payload".to_vec()]);
    }

    #[test]
    fn attach_routes_by_discriminator() {
        struct Demux;

        impl Layer for Demux {
            fn name(&self) -> &'static str {
                "demux"
            }

            fn recv(&mut self, ctx: &mut LayerContext<'_>, bytes: &[u8]) -> SessionResult<()> {
                ctx.forward_route(bytes[0], bytes[1..].to_vec())
            }

            fn send(&mut self, ctx: &mut LayerContext<'_>, payload: &[u8]) -> SessionResult<()> {
                ctx.send_down(payload.to_vec());
                Ok(())
            }
        }

        let mut stack = LayerStack::new();
        let demux = stack.add_layer(Demux);
        let upper = stack.add_layer(Passthrough);
        stack.chain(&[demux]);
        stack.attach(demux, 0x7, upper);

        let mut shared = shared();

        let output = stack.recv(&mut shared, &[0x7, 0xAA, 0xBB]).unwrap();
        assert_eq!(output.events.len(), 1);

        // An unmapped discriminator is an error, not a silent drop.
        assert!(stack.recv(&mut shared, &[0x9, 0x00]).is_err());

        // A send from the attached layer leaves through the demux layer.
        let output = stack.send_from(&mut shared, upper, &[0xCC]).unwrap();
        assert_eq!(output.transport, vec![vec![0xCC]]);
    }
}
