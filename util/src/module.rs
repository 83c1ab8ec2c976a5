//! Module interfaces
//!
//! Every module run by an executable's cyclic loop implements [`State`].
//! Modules which command hardware also implement [`SafeMode`].

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// The module's internal state.
///
/// The state is built with `Default`, initialised once with [`State::init`]
/// and then processed once per cycle with [`State::proc`].
pub trait State {
    /// Data required during initialisation, usually a parameter file path.
    type InitData;
    /// An error which can occur during initialisation.
    type InitError;

    /// Data consumed on each cycle.
    type InputData;
    /// Data produced on each cycle.
    type OutputData;
    /// A report on the status of the cyclic processing.
    type StatusReport;
    /// An error which can occur during cyclic processing.
    type ProcError;

    /// Initialise the module.
    ///
    /// # Inputs
    /// - `init_data`: The input data required by the module
    /// - `session`: The current session
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>;

    /// Process one cycle.
    ///
    /// # Outputs
    /// - On success a tuple of the output data and status report.
    /// - On error a `ProcError` instance, the module's outputs are left as
    ///   they were on the previous cycle.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;
}

/// A module which can be ordered into a safe configuration at any time.
pub trait SafeMode {
    /// Abandon the current activity and move to the safe configuration.
    ///
    /// Must never fail.
    fn make_safe(&mut self);
}
