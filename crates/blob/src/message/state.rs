use std::cmp::Ordering;
use std::fmt;

/// Where an exchange stands.
///
/// The states form the chain
/// `Init < InitSending < Sending < InitReceiving < Receiving < Finished`; `Aborted` sits
/// outside it and compares only equal to itself. `Finished` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MessageState {
    /// no connection requested yet
    #[default]
    Init,
    /// sending the request message
    InitSending,
    /// sending the upload body
    Sending,
    /// receiving until the response head is parsed
    InitReceiving,
    /// receiving the response body
    Receiving,
    Finished,
    Aborted,
}

impl MessageState {
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageState::Finished | MessageState::Aborted)
    }

    fn rank(self) -> Option<u8> {
        match self {
            MessageState::Init => Some(0),
            MessageState::InitSending => Some(1),
            MessageState::Sending => Some(2),
            MessageState::InitReceiving => Some(3),
            MessageState::Receiving => Some(4),
            MessageState::Finished => Some(5),
            MessageState::Aborted => None,
        }
    }
}

impl PartialOrd for MessageState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            (None, None) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageState::Init => "init",
            MessageState::InitSending => "init-sending",
            MessageState::Sending => "sending",
            MessageState::InitReceiving => "init-receiving",
            MessageState::Receiving => "receiving",
            MessageState::Finished => "finished",
            MessageState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_is_ordered() {
        let chain = [
            MessageState::Init,
            MessageState::InitSending,
            MessageState::Sending,
            MessageState::InitReceiving,
            MessageState::Receiving,
            MessageState::Finished,
        ];
        for pair in chain.windows(2) {
            assert!(pair[0] < pair[1], "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn aborted_is_outside_the_chain() {
        assert_eq!(MessageState::Aborted.partial_cmp(&MessageState::Init), None);
        assert_eq!(MessageState::Finished.partial_cmp(&MessageState::Aborted), None);
        assert_eq!(MessageState::Aborted.partial_cmp(&MessageState::Aborted), Some(Ordering::Equal));
        assert!(MessageState::Aborted.is_terminal());
        assert!(MessageState::Finished.is_terminal());
        assert!(!MessageState::Receiving.is_terminal());
    }
}
