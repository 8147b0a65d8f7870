//! The JTAG TAP controller state graph.
//!
//! [`tms_walk`] produces the TMS sequence moving the TAP controller from
//! one state to another, [`next_state`] is the single-step transition
//! function of the 16-state graph and is used to cross-check the walks.

/// The sixteen states of the JTAG TAP controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapState {
    /// Test-Logic-Reset.
    Reset,
    /// Run-Test/Idle.
    Idle,
    /// Select-DR-Scan.
    DrSelect,
    /// Capture-DR.
    DrCapture,
    /// Shift-DR.
    DrShift,
    /// Exit1-DR.
    DrExit1,
    /// Pause-DR.
    DrPause,
    /// Exit2-DR.
    DrExit2,
    /// Update-DR.
    DrUpdate,
    /// Select-IR-Scan.
    IrSelect,
    /// Capture-IR.
    IrCapture,
    /// Shift-IR.
    IrShift,
    /// Exit1-IR.
    IrExit1,
    /// Pause-IR.
    IrPause,
    /// Exit2-IR.
    IrExit2,
    /// Update-IR.
    IrUpdate,
}

impl TapState {
    /// All states, for exhaustive cross-checks.
    pub const ALL: [TapState; 16] = [
        TapState::Reset,
        TapState::Idle,
        TapState::DrSelect,
        TapState::DrCapture,
        TapState::DrShift,
        TapState::DrExit1,
        TapState::DrPause,
        TapState::DrExit2,
        TapState::DrUpdate,
        TapState::IrSelect,
        TapState::IrCapture,
        TapState::IrShift,
        TapState::IrExit1,
        TapState::IrPause,
        TapState::IrExit2,
        TapState::IrUpdate,
    ];

    /// Whether the state belongs to the DR column of the graph.
    pub fn in_dr_scan(self) -> bool {
        use TapState::*;
        matches!(
            self,
            DrSelect | DrCapture | DrShift | DrExit1 | DrPause | DrExit2 | DrUpdate
        )
    }

    /// Whether the state belongs to the IR column of the graph.
    pub fn in_ir_scan(self) -> bool {
        use TapState::*;
        matches!(
            self,
            IrSelect | IrCapture | IrShift | IrExit1 | IrPause | IrExit2 | IrUpdate
        )
    }
}

/// A TMS sequence of up to eight clocks, sent LSB first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TmsWalk {
    /// The TMS levels, bit 0 first.
    pub bits: u8,
    /// The number of clocks.
    pub count: u8,
}

/// The state reached from `from` after one clock with the given TMS
/// level.
pub fn next_state(from: TapState, tms: bool) -> TapState {
    use TapState::*;
    match from {
        Reset => {
            if tms {
                Reset
            } else {
                Idle
            }
        }
        Idle => {
            if tms {
                DrSelect
            } else {
                Idle
            }
        }
        DrSelect => {
            if tms {
                IrSelect
            } else {
                DrCapture
            }
        }
        DrCapture | DrShift => {
            if tms {
                DrExit1
            } else {
                DrShift
            }
        }
        DrExit1 => {
            if tms {
                DrUpdate
            } else {
                DrPause
            }
        }
        DrPause => {
            if tms {
                DrExit2
            } else {
                DrPause
            }
        }
        DrExit2 => {
            if tms {
                DrUpdate
            } else {
                DrShift
            }
        }
        DrUpdate | IrUpdate => {
            if tms {
                DrSelect
            } else {
                Idle
            }
        }
        IrSelect => {
            if tms {
                Reset
            } else {
                IrCapture
            }
        }
        IrCapture | IrShift => {
            if tms {
                IrExit1
            } else {
                IrShift
            }
        }
        IrExit1 => {
            if tms {
                IrUpdate
            } else {
                IrPause
            }
        }
        IrPause => {
            if tms {
                IrExit2
            } else {
                IrPause
            }
        }
        IrExit2 => {
            if tms {
                IrUpdate
            } else {
                IrShift
            }
        }
    }
}

/// The TMS sequence that moves the TAP controller from `from` to `to`.
///
/// The walk is built greedily along the graph and never needs more than
/// eight clocks. `from == to` yields an empty walk.
pub fn tms_walk(from: TapState, to: TapState) -> TmsWalk {
    use TapState::*;
    let mut bits = 0u8;
    let mut count = 0u8;
    let mut state = from;
    while state != to {
        let tms = match state {
            Reset => false,
            Idle => true,
            DrSelect => !to.in_dr_scan(),
            DrCapture => to != DrShift,
            DrShift => true,
            DrExit1 => !(to == DrPause || to == DrExit2),
            DrPause => true,
            DrExit2 => to != DrShift,
            DrUpdate => to != Idle,
            IrSelect => !to.in_ir_scan(),
            IrCapture => to != IrShift,
            IrShift => true,
            IrExit1 => !(to == IrPause || to == IrExit2),
            IrPause => true,
            IrExit2 => to != IrShift,
            IrUpdate => to != Idle,
        };
        bits |= u8::from(tms) << count;
        count += 1;
        state = next_state(state, tms);
    }
    TmsWalk { bits, count }
}

/// The number of constant-TMS runs in a walk, which is the number of
/// records its serialization takes.
pub fn level_runs(walk: TmsWalk) -> usize {
    if walk.count == 0 {
        return 0;
    }
    let mut runs = 1;
    for i in 1..walk.count {
        if ((walk.bits >> i) ^ (walk.bits >> (i - 1))) & 1 != 0 {
            runs += 1;
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn walks_reach_their_target() {
        for from in TapState::ALL {
            for to in TapState::ALL {
                let walk = tms_walk(from, to);
                assert!(walk.count <= 8, "{from:?} -> {to:?} took {}", walk.count);

                let mut state = from;
                for i in 0..walk.count {
                    state = next_state(state, (walk.bits >> i) & 1 != 0);
                }
                assert_eq!(state, to, "walk from {from:?} did not reach {to:?}");
            }
        }
    }

    #[test]
    fn walk_to_self_is_empty() {
        for state in TapState::ALL {
            assert_eq!(tms_walk(state, state).count, 0);
        }
    }

    #[test]
    fn known_walks() {
        // Reset -> Shift-DR: 0, 1, 0, 0.
        let walk = tms_walk(TapState::Reset, TapState::DrShift);
        assert_eq!(walk, TmsWalk { bits: 0b0010, count: 4 });

        // Idle -> Shift-IR: 1, 1, 0, 0.
        let walk = tms_walk(TapState::Idle, TapState::IrShift);
        assert_eq!(walk, TmsWalk { bits: 0b0011, count: 4 });

        // Exit1-DR -> Idle: 1, 0.
        let walk = tms_walk(TapState::DrExit1, TapState::Idle);
        assert_eq!(walk, TmsWalk { bits: 0b01, count: 2 });
    }

    #[test]
    fn level_run_counting() {
        assert_eq!(level_runs(TmsWalk { bits: 0, count: 0 }), 0);
        assert_eq!(level_runs(TmsWalk { bits: 0b0010, count: 4 }), 3);
        assert_eq!(level_runs(TmsWalk { bits: 0b0011, count: 4 }), 2);
        assert_eq!(level_runs(TmsWalk { bits: 0b1111, count: 4 }), 1);
        // 1001110: low, three high, two low, high.
        assert_eq!(level_runs(TmsWalk { bits: 0b1001110, count: 7 }), 4);
    }
}
