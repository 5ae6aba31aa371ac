//! System call command ids.
//!
//! The low ten bits of the accumulator select one of 1024 commands. Ids
//! not listed here are free for services to claim with `RegisterService`.

/// `int 250`: the caller blocks until a service answers.
pub const FUNCTION_VECTOR: u8 = 250;
/// `int 251`: the caller continues immediately.
pub const ACTION_VECTOR: u8 = 251;

pub const COMMAND_COUNT: usize = 1024;
pub const COMMAND_MASK: u64 = COMMAND_COUNT as u64 - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SyscallNumber {
    Unset = 0,
    ServiceReturn = 1,
    /// Message target of a forwarded IRQ; never dispatched.
    Interrupt = 2,

    GetProcessIdForCommand = 10,

    // Memory (20-29)
    RequestMemory = 20,
    RequestMessageBuffer = 21,
    GetPhysicalMemory = 22,
    TranslateVirtualToPhysicalAddress = 23,

    // Threads and processes (40-49)
    SetThreadPriority = 41,
    ThreadSleep = 42,
    GetProcessByName = 43,
    KillProcess = 44,
    GetCurrentProcessId = 47,
    GetCurrentThreadId = 48,
    SetThreadStorageSegmentBase = 49,

    // Services (50-59)
    SetServiceStatus = 50,
    RegisterService = 51,
    RegisterInterrupt = 52,
    CreateThread = 53,
    StartThread = 54,
    KillThread = 55,

    // Debug output (60-69)
    WriteDebugMessage = 60,
    WriteDebugChar = 61,

    Unknown = u32::MAX,
}

impl SyscallNumber {
    pub fn id(self) -> u32 {
        self as u32
    }
}

impl From<u32> for SyscallNumber {
    fn from(num: u32) -> Self {
        match num {
            0 => Self::Unset,
            1 => Self::ServiceReturn,
            2 => Self::Interrupt,
            10 => Self::GetProcessIdForCommand,
            20 => Self::RequestMemory,
            21 => Self::RequestMessageBuffer,
            22 => Self::GetPhysicalMemory,
            23 => Self::TranslateVirtualToPhysicalAddress,
            41 => Self::SetThreadPriority,
            42 => Self::ThreadSleep,
            43 => Self::GetProcessByName,
            44 => Self::KillProcess,
            47 => Self::GetCurrentProcessId,
            48 => Self::GetCurrentThreadId,
            49 => Self::SetThreadStorageSegmentBase,
            50 => Self::SetServiceStatus,
            51 => Self::RegisterService,
            52 => Self::RegisterInterrupt,
            53 => Self::CreateThread,
            54 => Self::StartThread,
            55 => Self::KillThread,
            60 => Self::WriteDebugMessage,
            61 => Self::WriteDebugChar,
            _ => Self::Unknown,
        }
    }
}
