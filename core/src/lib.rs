pub mod alarm; // skipcq: RS-D1001

pub mod clock; // skipcq: RS-D1001

pub mod errors; // skipcq: RS-D1001

pub mod events; // skipcq: RS-D1001

pub mod reactive; // skipcq: RS-D1001

pub mod repeat; // skipcq: RS-D1001

pub mod resolver; // skipcq: RS-D1001

pub mod time_of_day; // skipcq: RS-D1001

pub mod utils; // skipcq: RS-D1001

pub mod prelude {
    pub use crate::alarm::{AlarmConfig, AlarmStatus, DaytimeAlarm, alarm};
    pub use crate::clock::{AdvanceableAlarmClock, AlarmClock, SystemClock, VirtualClock};
    pub use crate::errors::AlarmError;
    pub use crate::events::{AlarmCallback, DiagnosticListener};
    pub use crate::repeat::{NthExpr, Repeat, RepeatPreset, RepeatRule};
    pub use crate::time_of_day::TimeOfDay;
}
