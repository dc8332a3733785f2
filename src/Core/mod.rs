pub mod clock;
pub mod context;
pub mod futex;
pub mod level;
pub mod status;
pub mod thread_name;
pub mod wait_strategy;

pub use clock::{Clock, DummyNanoClock, FixedClock, NanoClock, NanoClockKind, SystemClock, SystemNanoClock};
pub use context::{
    ContextDataProvider, ContextMap, ContextSnapshot, ContextStack, EmptyContextProvider,
    ThreadContext, ThreadContextProvider,
};
pub use level::Level;
pub use status::{ListStatusListener, StatusData, StatusListener, StatusLogger, STATUS_TARGET};
pub use thread_name::{ThreadInfo, ThreadNameStrategy};
pub use wait_strategy::{
    BlockingWaitStrategy, BusySpinWaitStrategy, SleepingWaitStrategy, TimeoutBlockingWaitStrategy,
    WaitStrategy, WaitStrategyKind, YieldingWaitStrategy,
};
