//! UI 驱动接口与会话管理
//!
//! 执行器只依赖这里定义的能力集合，具体的浏览器驱动由宿主程序提供。

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::DriverError;

/// 元素等待状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Attached,
    Visible,
}

/// 元素等待选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub state: ElementState,
}

impl WaitOptions {
    pub fn visible(timeout: Duration) -> Self {
        Self {
            timeout,
            state: ElementState::Visible,
        }
    }

    pub fn attached(timeout: Duration) -> Self {
        Self {
            timeout,
            state: ElementState::Attached,
        }
    }
}

/// 页面元素句柄
#[async_trait]
pub trait ElementHandle: Send + Sync {
    async fn is_visible(&self) -> Result<bool, DriverError>;

    async fn text_content(&self) -> Result<Option<String>, DriverError>;

    async fn input_value(&self) -> Result<String, DriverError>;
}

/// UI 驱动
#[async_trait]
pub trait UiDriver: Send + Sync {
    /// 打开 URL
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// 点击元素
    async fn click(&self, selector: &str) -> Result<(), DriverError>;

    /// 填充输入框
    async fn fill(&self, selector: &str, value: &str) -> Result<(), DriverError>;

    /// 等待元素达到指定状态
    async fn wait_for_selector(
        &self,
        selector: &str,
        options: WaitOptions,
    ) -> Result<Box<dyn ElementHandle>, DriverError>;

    /// 截取当前页面 (PNG)
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    /// 浏览器版本
    fn version(&self) -> Option<String> {
        None
    }

    /// 关闭驱动并释放资源
    async fn close(&self) -> Result<(), DriverError>;
}

/// 驱动提供者 - 每个测试用例启动一个驱动实例
#[async_trait]
pub trait DriverProvider: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn UiDriver>, DriverError>;
}

/// 未配置驱动时使用的提供者，启动总是失败
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableDriverProvider;

#[async_trait]
impl DriverProvider for UnavailableDriverProvider {
    async fn launch(&self) -> Result<Arc<dyn UiDriver>, DriverError> {
        Err(DriverError::Setup("no UI driver configured".to_string()))
    }
}

/// 驱动会话
///
/// 正常路径通过 [`DriverSession::release`] 异步关闭；
/// 会话在未释放时被丢弃 (future 取消或 panic 展开) 则在当前运行时上调度关闭。
pub struct DriverSession {
    driver: Arc<dyn UiDriver>,
    released: bool,
}

impl DriverSession {
    /// 启动驱动并创建会话
    pub async fn acquire(provider: &dyn DriverProvider) -> Result<Self, DriverError> {
        let driver = provider.launch().await?;
        debug!("UI 驱动已启动: {:?}", driver.version());
        Ok(Self {
            driver,
            released: false,
        })
    }

    pub fn driver(&self) -> &dyn UiDriver {
        self.driver.as_ref()
    }

    /// 关闭驱动，关闭失败只记录日志
    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = self.driver.close().await {
            warn!("关闭 UI 驱动失败: {}", e);
        } else {
            debug!("UI 驱动已关闭");
        }
    }
}

impl Drop for DriverSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let driver = Arc::clone(&self.driver);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = driver.close().await {
                        warn!("关闭 UI 驱动失败: {}", e);
                    }
                });
            }
            Err(_) => warn!("没有可用的运行时，UI 驱动未能关闭"),
        }
    }
}
