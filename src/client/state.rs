/// Lifecycle state of a [`TcpClient`](super::TcpClient).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientState {
    /// Never started, or the last start attempt failed.
    #[default]
    Idle,
    /// Connecting to the server.
    Starting,
    /// Connected; reader and idle timer are running.
    Running,
    /// Tearing the session down.
    Stopping,
    /// Stopped; `start` opens a new session.
    Stopped,
    /// Terminal. Every operation fails with `Disposed`.
    Disposed,
}

impl ClientState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ClientState::Starting | ClientState::Running | ClientState::Stopping
        )
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Disposed => write!(f, "Disposed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ClientState::Idle, false)]
    #[case(ClientState::Starting, true)]
    #[case(ClientState::Running, true)]
    #[case(ClientState::Stopping, true)]
    #[case(ClientState::Stopped, false)]
    #[case(ClientState::Disposed, false)]
    fn only_in_flight_states_are_active(#[case] state: ClientState, #[case] active: bool) {
        assert_eq!(state.is_active(), active);
    }
}
