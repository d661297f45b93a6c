//! Return stack items (RSI) and the return stack that rides along with every
//! request/response pair.
//!
//! A forwarder pushes an RSI onto a request on the way in and pops its own
//! entry back off the matching response on the way out, so the stack reads
//! bottom -> top as outer -> inner forwarder.

use bytes::{Buf, BufMut, BytesMut};

use crate::Error;

/// A single routing token: who pushed it, and whatever that pusher needs to
/// find its own state again when the response comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReturnStackItem {
    pub creator_id: u32,
    pub info: u32,
}

impl ReturnStackItem {
    pub const WIRE_SIZE: usize = 8;

    pub fn new(creator_id: u32, info: u32) -> Self {
        Self { creator_id, info }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.creator_id);
        buf.put_u32_le(self.info);
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, Error> {
        if buf.remaining() < Self::WIRE_SIZE {
            return Err(Error::UnexpectedEof);
        }

        Ok(Self {
            creator_id: buf.get_u32_le(),
            info: buf.get_u32_le(),
        })
    }
}

/// The RSI stack carried by a request and, on success, moved verbatim onto
/// its response.
///
/// Bottom-of-stack is index 0; [`ReturnStack::push`]/[`ReturnStack::pop`]
/// operate on the top, matching how forwarders are expected to use it: push
/// on the way in, pop on the way back out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReturnStack(Vec<ReturnStackItem>);

impl ReturnStack {
    /// Wire-level cap: `rsi_count` is a single byte.
    pub const MAX_LEN: usize = 255;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn top(&self) -> Option<&ReturnStackItem> {
        self.0.last()
    }

    /// Push a new top-of-stack entry.
    ///
    /// An empty stack permits exactly one push (see invariant in the data
    /// model); beyond that this simply enforces the 255-entry wire cap.
    pub fn push(&mut self, item: ReturnStackItem) -> Result<(), Error> {
        if self.0.len() >= Self::MAX_LEN {
            return Err(Error::ReturnStackOverflow);
        }

        self.0.push(item);
        Ok(())
    }

    /// Pop the top-of-stack entry. Returns `None` if the stack is empty.
    pub fn pop(&mut self) -> Option<ReturnStackItem> {
        self.0.pop()
    }

    /// Number of bytes this stack occupies on the wire, including the
    /// `rsi_count` byte.
    pub fn wire_size(&self) -> usize {
        1 + self.0.len() * ReturnStackItem::WIRE_SIZE
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.0.len() as u8);

        for item in &self.0 {
            item.encode(buf);
        }
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Self, Error> {
        if !buf.has_remaining() {
            return Err(Error::UnexpectedEof);
        }

        let count = buf.get_u8() as usize;
        let mut stack = Vec::with_capacity(count);

        for _ in 0..count {
            stack.push(ReturnStackItem::decode(buf)?);
        }

        Ok(Self(stack))
    }
}

impl From<Vec<ReturnStackItem>> for ReturnStack {
    fn from(items: Vec<ReturnStackItem>) -> Self {
        Self(items)
    }
}

impl AsRef<[ReturnStackItem]> for ReturnStack {
    fn as_ref(&self) -> &[ReturnStackItem] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_the_wire() {
        let mut stack = ReturnStack::new();
        stack.push(ReturnStackItem::new(1, 0x1000)).unwrap();
        stack.push(ReturnStackItem::new(2, 0x2000)).unwrap();

        let mut buf = BytesMut::new();
        stack.encode(&mut buf);
        assert_eq!(buf.len(), stack.wire_size());

        let mut cursor = &buf[..];
        let decoded = ReturnStack::decode(&mut cursor).unwrap();
        assert_eq!(decoded, stack);
        assert_eq!(decoded.top(), Some(&ReturnStackItem::new(2, 0x2000)));
    }

    #[test]
    fn pop_is_lifo() {
        let mut stack = ReturnStack::new();
        stack.push(ReturnStackItem::new(1, 1)).unwrap();
        stack.push(ReturnStackItem::new(2, 2)).unwrap();

        assert_eq!(stack.pop(), Some(ReturnStackItem::new(2, 2)));
        assert_eq!(stack.pop(), Some(ReturnStackItem::new(1, 1)));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn rejects_growth_past_the_wire_cap() {
        let mut stack = ReturnStack::new();
        for i in 0..ReturnStack::MAX_LEN {
            stack.push(ReturnStackItem::new(i as u32, 0)).unwrap();
        }

        assert_eq!(
            stack.push(ReturnStackItem::new(999, 0)),
            Err(Error::ReturnStackOverflow)
        );
    }
}
