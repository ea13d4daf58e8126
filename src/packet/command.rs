use num_enum::{IntoPrimitive, TryFromPrimitive};

/// High bit of the command byte: the sequence flag of flow-controlled commands (PUBLISH and
///  ACKNOWLEDGE)
pub const SEQUENCE_FLAG: u8 = 0x80;

/// The lower seven bits of the command byte carry the command code
pub const COMMAND_CODE_MASK: u8 = 0x7f;

#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
pub enum Command {
    /// Tunneled application bytes, in either direction. Sequenced.
    Publish = 0,
    /// Confirms a PUBLISH, echoing its sequence flag
    Acknowledge = 1,
    /// Session open request from the client, payload is the upstream IPv4 address and port
    Connect = 2,
    /// Session open confirmation from the gateway
    ConnAck = 3,
    Disconnect = 4,
}

impl Command {
    /// Splits a raw command byte into its command code and sequence flag. Codes outside the
    ///  known set yield `None` - they are reserved for future use.
    pub fn parse(raw: u8) -> (Option<Command>, bool) {
        let command = Command::try_from_primitive(raw & COMMAND_CODE_MASK).ok();
        (command, raw & SEQUENCE_FLAG != 0)
    }

    pub fn to_raw(self, sequence_flag: bool) -> u8 {
        let code: u8 = self.into();
        if sequence_flag {
            code | SEQUENCE_FLAG
        }
        else {
            code
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    #[rstest]
    #[case::publish(0x00, Some(Command::Publish), false)]
    #[case::publish_flagged(0x80, Some(Command::Publish), true)]
    #[case::ack(0x01, Some(Command::Acknowledge), false)]
    #[case::ack_flagged(0x81, Some(Command::Acknowledge), true)]
    #[case::connect(0x02, Some(Command::Connect), false)]
    #[case::connack(0x03, Some(Command::ConnAck), false)]
    #[case::disconnect(0x04, Some(Command::Disconnect), false)]
    #[case::unknown(0x05, None, false)]
    #[case::unknown_flagged(0xff, None, true)]
    fn test_parse(#[case] raw: u8, #[case] command: Option<Command>, #[case] sequence_flag: bool) {
        assert_eq!(Command::parse(raw), (command, sequence_flag));
    }

    #[rstest]
    #[case(Command::Publish, false, 0x00)]
    #[case(Command::Publish, true, 0x80)]
    #[case(Command::Acknowledge, true, 0x81)]
    #[case(Command::Disconnect, false, 0x04)]
    fn test_to_raw(#[case] command: Command, #[case] sequence_flag: bool, #[case] expected: u8) {
        assert_eq!(command.to_raw(sequence_flag), expected);
    }
}
