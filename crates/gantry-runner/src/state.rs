use gantry_types::Status;

/// Job state machine. Any phase may transition directly to `Terminal`
/// on error, cancel, or timeout; otherwise phases advance in the order
/// listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Setup,
    Clone,
    Services,
    Build,
    Publish,
    Deploy,
    Notify,
    Terminal(Status),
}

impl Phase {
    pub fn next(self) -> Phase {
        match self {
            Phase::Created => Phase::Setup,
            Phase::Setup => Phase::Clone,
            Phase::Clone => Phase::Services,
            Phase::Services => Phase::Build,
            Phase::Build => Phase::Publish,
            Phase::Publish => Phase::Deploy,
            Phase::Deploy => Phase::Notify,
            Phase::Notify => Phase::Terminal(Status::Success),
            terminal @ Phase::Terminal(_) => terminal,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Created => "created",
            Phase::Setup => "setup",
            Phase::Clone => "clone",
            Phase::Services => "services",
            Phase::Build => "build",
            Phase::Publish => "publish",
            Phase::Deploy => "deploy",
            Phase::Notify => "notify",
            Phase::Terminal(_) => "terminal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_in_declared_order() {
        let order = [
            Phase::Created,
            Phase::Setup,
            Phase::Clone,
            Phase::Services,
            Phase::Build,
            Phase::Publish,
            Phase::Deploy,
            Phase::Notify,
        ];
        for pair in order.windows(2) {
            assert_eq!(pair[0].next(), pair[1]);
        }
    }

    #[test]
    fn terminal_is_absorbing() {
        let terminal = Phase::Terminal(Status::Killed);
        assert_eq!(terminal.next(), terminal);
    }
}
