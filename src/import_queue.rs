use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::error::{IngestError, Result};
use crate::model::Book;
use crate::Ingestor;

/// 导入状态枚举
///
/// 表示导入任务的各个阶段
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum ImportStatus {
    /// 等待处理
    Pending,
    /// 正在解析文件
    Parsing,
    /// 完成
    Completed,
    /// 失败（包含错误信息）
    Failed(String),
}

/// 导入任务
///
/// 表示一个待处理或正在处理的书籍导入任务
#[derive(Clone, Debug)]
pub struct ImportTask {
    /// 任务 ID（队列内递增）
    pub task_id: usize,
    /// 文件路径
    pub file_path: PathBuf,
    /// 当前状态
    pub status: ImportStatus,
    /// 进度（0.0 - 1.0）
    pub progress: f32,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl ImportTask {
    pub fn new(task_id: usize, file_path: impl Into<PathBuf>) -> Self {
        Self {
            task_id,
            file_path: file_path.into(),
            status: ImportStatus::Pending,
            progress: 0.0,
            created_at: Utc::now(),
        }
    }
}

/// 单个任务的导入结果
#[derive(Debug)]
pub struct ImportOutcome {
    pub task_id: usize,
    pub file_path: PathBuf,
    pub result: Result<Book>,
}

/// 导入队列
///
/// 管理所有导入任务的队列，支持并发控制。
/// 内部状态都在 `Arc` 中，克隆后共享同一个队列
#[derive(Clone)]
pub struct ImportQueue {
    /// 待处理任务队列
    tasks: Arc<Mutex<VecDeque<ImportTask>>>,
    /// 正在处理的任务（task_id -> task）
    active_tasks: Arc<Mutex<HashMap<usize, ImportTask>>>,
    /// 已结束的任务（task_id -> task）
    finished_tasks: Arc<Mutex<HashMap<usize, ImportTask>>>,
    next_id: Arc<AtomicUsize>,
    /// 最大并发任务数
    max_concurrent: usize,
}

fn lock_error<E: std::fmt::Display>(what: &str) -> impl FnOnce(E) -> IngestError + '_ {
    move |e| IngestError::Queue(format!("锁定{}失败: {}", what, e))
}

impl ImportQueue {
    /// 创建新的导入队列
    ///
    /// # 参数
    /// - `max_concurrent`: 最大并发任务数
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(VecDeque::new())),
            active_tasks: Arc::new(Mutex::new(HashMap::new())),
            finished_tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicUsize::new(1)),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// 为文件创建任务并入队，返回任务 ID
    pub fn submit(&self, file_path: impl Into<PathBuf>) -> Result<usize> {
        let task_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.enqueue(ImportTask::new(task_id, file_path))?;
        Ok(task_id)
    }

    /// 将任务加入队列
    ///
    /// # 参数
    /// - `task`: 要加入的任务
    pub fn enqueue(&self, task: ImportTask) -> Result<()> {
        let mut tasks = self.tasks.lock().map_err(lock_error("任务队列"))?;
        tasks.push_back(task);
        Ok(())
    }

    /// 标记任务为活动状态
    pub fn mark_active(&self, mut task: ImportTask) -> Result<()> {
        let mut active = self.active_tasks.lock().map_err(lock_error("活动任务"))?;
        task.status = ImportStatus::Parsing;
        active.insert(task.task_id, task);
        Ok(())
    }

    /// 标记任务为完成
    pub fn mark_completed(&self, task_id: usize) -> Result<()> {
        self.finish(task_id, ImportStatus::Completed)
    }

    /// 标记任务为失败
    pub fn mark_failed(&self, task_id: usize, message: impl Into<String>) -> Result<()> {
        self.finish(task_id, ImportStatus::Failed(message.into()))
    }

    fn finish(&self, task_id: usize, status: ImportStatus) -> Result<()> {
        let mut active = self.active_tasks.lock().map_err(lock_error("活动任务"))?;
        if let Some(mut task) = active.remove(&task_id) {
            task.progress = 1.0;
            task.status = status;
            let mut finished = self.finished_tasks.lock().map_err(lock_error("已结束任务"))?;
            finished.insert(task_id, task);
        }
        Ok(())
    }

    /// 取走全部已结束的任务，按任务 ID 排序
    ///
    /// 取走后 `get_status` 不再能查到这些任务
    pub fn take_finished(&self) -> Result<Vec<ImportTask>> {
        let mut finished = self.finished_tasks.lock().map_err(lock_error("已结束任务"))?;
        let mut tasks: Vec<ImportTask> = finished.drain().map(|(_, task)| task).collect();
        tasks.sort_by_key(|t| t.task_id);
        Ok(tasks)
    }

    /// 获取任务状态
    ///
    /// 依次查找活动任务、已结束任务和待处理任务
    pub fn get_status(&self, task_id: usize) -> Option<ImportTask> {
        if let Some(task) = self.active_tasks.lock().ok()?.get(&task_id) {
            return Some(task.clone());
        }
        if let Some(task) = self.finished_tasks.lock().ok()?.get(&task_id) {
            return Some(task.clone());
        }
        let pending = self.tasks.lock().ok()?;
        pending.iter().find(|t| t.task_id == task_id).cloned()
    }

    /// 更新任务进度和状态
    ///
    /// # 参数
    /// - `task_id`: 任务 ID
    /// - `progress`: 新的进度值（0.0 - 1.0）
    /// - `status`: 新的状态
    pub fn update_progress(&self, task_id: usize, progress: f32, status: ImportStatus) -> Result<()> {
        let mut active = self.active_tasks.lock().map_err(lock_error("活动任务"))?;

        if let Some(task) = active.get_mut(&task_id) {
            task.progress = progress.clamp(0.0, 1.0);
            task.status = status;
        }

        Ok(())
    }

    /// 获取队列中的任务数量
    pub fn queue_size(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// 获取活动任务数量
    pub fn active_count(&self) -> usize {
        self.active_tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// 取出全部待处理任务并发导入
    ///
    /// 并发数由信号量限制，解析在阻塞线程池中执行。
    /// 结果按提交顺序返回，单个任务失败不影响其他任务
    pub async fn run_batch(&self, ingestor: Arc<Ingestor>) -> Vec<ImportOutcome> {
        let pending: Vec<ImportTask> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(e) => {
                warn!(error = %e, "任务队列锁失效，批量导入取消");
                return Vec::new();
            }
        };
        info!(tasks = pending.len(), max_concurrent = self.max_concurrent, "开始批量导入");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(pending.len());

        for task in pending {
            let task_id = task.task_id;
            let file_path = task.file_path.clone();
            let queue = self.clone();
            let ingestor = Arc::clone(&ingestor);
            let semaphore = Arc::clone(&semaphore);

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| IngestError::Queue(e.to_string()))?;
                queue.process(task, ingestor).await
            });
            handles.push((task_id, file_path, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (task_id, file_path, handle) in handles {
            let result = handle
                .await
                .unwrap_or_else(|e| Err(IngestError::Queue(format!("导入任务异常终止: {}", e))));
            outcomes.push(ImportOutcome {
                task_id,
                file_path,
                result,
            });
        }
        outcomes
    }

    async fn process(&self, task: ImportTask, ingestor: Arc<Ingestor>) -> Result<Book> {
        let task_id = task.task_id;
        let path = task.file_path.clone();
        self.mark_active(task)?;
        self.update_progress(task_id, 0.1, ImportStatus::Parsing)?;

        let result = tokio::task::spawn_blocking(move || ingestor.parse_path(&path))
            .await
            .unwrap_or_else(|e| Err(IngestError::Queue(format!("解析线程异常终止: {}", e))));

        match &result {
            Ok(book) => {
                info!(task_id, book_id = %book.id, chapters = book.chapters.len(), "导入完成");
                self.mark_completed(task_id)?;
            }
            Err(e) => {
                warn!(task_id, error = %e, "导入失败");
                self.mark_failed(task_id, e.to_string())?;
            }
        }
        result
    }
}

impl Default for ImportQueue {
    fn default() -> Self {
        Self::new(3) // 默认最多 3 个并发任务
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use std::fs;

    fn create_test_task(task_id: usize) -> ImportTask {
        ImportTask::new(task_id, format!("/test/book{}.epub", task_id))
    }

    #[test]
    fn test_queue_creation() {
        let queue = ImportQueue::new(3);
        assert_eq!(queue.queue_size(), 0);
        assert_eq!(queue.active_count(), 0);
        assert!(queue.take_finished().unwrap().is_empty());
    }

    #[test]
    fn test_enqueue() {
        let queue = ImportQueue::new(3);
        for i in 1..=3 {
            queue.enqueue(create_test_task(i)).unwrap();
        }
        assert_eq!(queue.queue_size(), 3);
        assert_eq!(queue.get_status(2).unwrap().status, ImportStatus::Pending);
    }

    #[test]
    fn test_submit_assigns_ids() {
        let queue = ImportQueue::new(2);
        let a = queue.submit("a.txt").unwrap();
        let b = queue.submit("b.txt").unwrap();
        assert_ne!(a, b);
        assert_eq!(queue.get_status(b).unwrap().status, ImportStatus::Pending);
    }

    #[test]
    fn test_mark_completed_and_failed() {
        let queue = ImportQueue::new(3);
        for i in 1..=2 {
            queue.mark_active(create_test_task(i)).unwrap();
        }
        assert_eq!(queue.active_count(), 2);

        queue.mark_completed(1).unwrap();
        queue.mark_failed(2, "坏文件").unwrap();
        assert_eq!(queue.active_count(), 0);

        let done = queue.get_status(1).unwrap();
        assert_eq!(done.status, ImportStatus::Completed);
        assert_eq!(done.progress, 1.0);
        assert_eq!(
            queue.get_status(2).unwrap().status,
            ImportStatus::Failed("坏文件".to_string())
        );
        assert!(queue.get_status(999).is_none());
    }

    #[test]
    fn test_update_progress() {
        let queue = ImportQueue::new(3);
        queue.mark_active(create_test_task(1)).unwrap();

        queue.update_progress(1, 0.5, ImportStatus::Parsing).unwrap();

        let status = queue.get_status(1).unwrap();
        assert_eq!(status.progress, 0.5);
        assert_eq!(status.status, ImportStatus::Parsing);
    }

    #[test]
    fn test_take_finished_drains() {
        let queue = ImportQueue::new(3);
        for i in [3, 1, 2] {
            queue.mark_active(create_test_task(i)).unwrap();
        }
        queue.mark_completed(3).unwrap();
        queue.mark_failed(1, "坏文件").unwrap();

        let finished = queue.take_finished().unwrap();
        assert_eq!(finished.iter().map(|t| t.task_id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(finished[0].status, ImportStatus::Failed("坏文件".to_string()));
        assert_eq!(finished[1].status, ImportStatus::Completed);

        // 取走之后不再保留
        assert!(queue.get_status(1).is_none());
        assert!(queue.get_status(3).is_none());
        assert!(queue.take_finished().unwrap().is_empty());
        // 仍在处理中的任务不受影响
        assert_eq!(queue.get_status(2).unwrap().status, ImportStatus::Parsing);
    }

    #[tokio::test]
    async fn test_run_batch_mixed_results() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        let empty = dir.path().join("empty.txt");
        let other = dir.path().join("notes.docx");
        fs::write(&good, "Chapter One\nIt was a dark and stormy night.").unwrap();
        fs::write(&empty, "   \n").unwrap();
        fs::write(&other, "whatever").unwrap();

        let queue = ImportQueue::new(2);
        let ids: Vec<usize> = [&good, &empty, &other]
            .iter()
            .map(|p| queue.submit(p.as_path()).unwrap())
            .collect();

        let ingestor = Arc::new(Ingestor::new(IngestConfig::default()));
        let outcomes = queue.run_batch(ingestor).await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes.iter().map(|o| o.task_id).collect::<Vec<_>>(), ids);

        let book = outcomes[0].result.as_ref().unwrap();
        assert_eq!(book.chapters[0].title, "Chapter One");
        assert!(matches!(outcomes[1].result, Err(IngestError::NoReadableContent(_))));
        assert!(matches!(outcomes[2].result, Err(IngestError::UnsupportedFormat(_))));

        assert_eq!(queue.queue_size(), 0);
        assert_eq!(queue.active_count(), 0);
        assert_eq!(queue.get_status(ids[0]).unwrap().status, ImportStatus::Completed);
        assert!(matches!(
            queue.get_status(ids[2]).unwrap().status,
            ImportStatus::Failed(_)
        ));

        let finished = queue.take_finished().unwrap();
        assert_eq!(finished.len(), 3);
        assert!(queue.get_status(ids[0]).is_none());
    }

    #[tokio::test]
    async fn test_run_batch_empty_queue() {
        let queue = ImportQueue::default();
        let outcomes = queue
            .run_batch(Arc::new(Ingestor::new(IngestConfig::default())))
            .await;
        assert!(outcomes.is_empty());
    }
}
