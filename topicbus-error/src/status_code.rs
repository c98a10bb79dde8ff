use std::fmt;

use num_enum::TryFromPrimitive;

/// Коды статуса ошибок шины.
///
/// Старший разряд кода задаёт [`Category`]: `0` успех, `1` общие,
/// `2` топики и подписки, `4` лимиты, `6` окружение.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    Success = 0,

    Internal = 1000,
    Unexpected = 1001,
    InvalidArgs = 1002,

    NotFound = 2000,
    AlreadyExists = 2001,
    TypeMismatch = 2002,
    InvalidPath = 2003,
    NotReady = 2004,
    InvalidConfig = 2005,

    QueueOverflow = 4000,
    QuotaExceeded = 4001,
    TopicLimitExceeded = 4002,
    SubscriberLimitExceeded = 4003,

    Io = 6000,
    Timeout = 6001,
}

/// Группа кода статуса, вычисляемая по его численному диапазону.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Success,
    General,
    Topic,
    Limit,
    Runtime,
}

/// Рекомендуемый уровень логирования ошибки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// `None`, если числу не соответствует ни один код.
    pub fn from_u32(value: u32) -> Option<Self> {
        Self::try_from(value).ok()
    }

    pub const fn category(self) -> Category {
        match self.code() / 1000 {
            0 => Category::Success,
            2 => Category::Topic,
            4 => Category::Limit,
            6 => Category::Runtime,
            _ => Category::General,
        }
    }

    /// Ошибка вызывающей стороны: путь, тип, порядок вызовов или лимит.
    pub fn is_client_error(self) -> bool {
        matches!(self.category(), Category::Topic | Category::Limit) || self == Self::InvalidArgs
    }

    /// Подсказка вызывающему коду: тот же вызов позже может пройти.
    /// Шина сама ничего не повторяет.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::QueueOverflow | Self::NotReady)
    }

    pub fn is_critical(self) -> bool {
        matches!(self, Self::Internal | Self::Unexpected)
    }

    pub fn log_level(self) -> LogLevel {
        match (self.category(), self) {
            (Category::Success, _) => LogLevel::Trace,
            (_, Self::NotFound | Self::AlreadyExists) => LogLevel::Debug,
            (Category::Topic, _) | (_, Self::InvalidArgs) => LogLevel::Info,
            (Category::Limit | Category::Runtime, _) => LogLevel::Warn,
            (Category::General, _) => LogLevel::Error,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(code: StatusCode) -> Self {
        code.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
