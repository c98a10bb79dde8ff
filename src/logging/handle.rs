use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;

/// Handle для управления lifecycle логирования.
///
/// Держит guard файлового sink'а: пока handle жив, фоновый writer пишет в
/// файл; при уничтожении буфер сбрасывается на диск.
pub struct LoggingHandle {
    _file_guard: Option<WorkerGuard>,
    file_path: Option<PathBuf>,
}

impl LoggingHandle {
    pub fn new(
        file_guard: Option<WorkerGuard>,
        file_path: Option<PathBuf>,
    ) -> Self {
        Self {
            _file_guard: file_guard,
            file_path,
        }
    }

    pub fn has_file_sink(&self) -> bool {
        self._file_guard.is_some()
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Сбрасывает буферы и завершает фоновый writer.
    pub fn shutdown(mut self) {
        if let Some(guard) = self._file_guard.take() {
            tracing::debug!(path = ?self.file_path, "Flushing file log sink");
            drop(guard);
        }
    }
}

impl std::fmt::Debug for LoggingHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LoggingHandle")
            .field("has_file_sink", &self.has_file_sink())
            .field("file_path", &self.file_path)
            .finish()
    }
}
