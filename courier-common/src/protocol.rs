//! Wire message payloads.
//!
//! Every event the agent ships is a small ASCII message: a three-letter tag
//! followed by `0x1f`-separated fields. The collector splits on the field
//! separator, so field contents must never contain it; [`Message::field`]
//! strips it on the way in.

/// Separator between fields inside one message payload.
///
/// Distinct from the frame separator used by the spool; this one travels over
/// the wire as part of the payload.
pub const FIELD_SEPARATOR: u8 = 0x1f;

/// The kinds of messages this agent emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Identity handshake, first message on every fresh connection
    Auth,
    /// A process appeared
    ProcessOpen,
    /// A process exited
    ProcessClose,
    /// An input device event (reserved for external producers)
    InputEvent,
    /// CPU usage sample
    CpuUsage,
}

impl MessageKind {
    /// The wire tag for this message kind.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Auth => "CAU",
            Self::ProcessOpen => "CPO",
            Self::ProcessClose => "CPC",
            Self::InputEvent => "CIE",
            Self::CpuUsage => "CCU",
        }
    }
}

/// Builder for one wire message payload.
#[derive(Debug, Clone)]
pub struct Message {
    buf: Vec<u8>,
}

impl Message {
    #[must_use]
    pub fn new(kind: MessageKind) -> Self {
        Self {
            buf: kind.tag().as_bytes().to_vec(),
        }
    }

    /// Append one field, preceded by the field separator.
    ///
    /// Any separator bytes inside the field itself are dropped so a hostile
    /// process name cannot splice extra fields into the message.
    #[must_use]
    pub fn field(mut self, value: impl AsRef<[u8]>) -> Self {
        self.buf.push(FIELD_SEPARATOR);
        self.buf
            .extend(value.as_ref().iter().filter(|&&b| b != FIELD_SEPARATOR));
        self
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn message_layout() {
        let msg = Message::new(MessageKind::ProcessOpen)
            .field("bash")
            .into_bytes();
        assert_eq!(msg, b"CPO\x1fbash");
    }

    #[test]
    fn multiple_fields() {
        let msg = Message::new(MessageKind::Auth)
            .field("aa:bb:cc:dd:ee:ff")
            .field("workstation")
            .into_bytes();
        assert_eq!(msg, b"CAU\x1faa:bb:cc:dd:ee:ff\x1fworkstation");
    }

    #[test]
    fn separator_stripped_from_fields() {
        let msg = Message::new(MessageKind::ProcessClose)
            .field(b"na\x1fme")
            .into_bytes();
        assert_eq!(msg, b"CPC\x1fname");
    }
}
