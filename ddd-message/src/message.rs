//! 传输消息（Message）
//!
//! 传输层的最小单元：唯一标识、原始负载、有序元数据与消息上下文。
//! 每条消息携带一个一次性的结果信号（Ack/Nack），由路由器在处理结束后写入，
//! 发布方或测试可通过 `acked`/`nacked`/`outcome` 异步等待。
//!
//! 克隆的消息共享同一个结果信号；`copy` 则生成拥有独立信号的副本，
//! 用于向多个订阅者扇出。
//!
use crate::context::MessageContext;
use std::collections::BTreeMap;
use std::collections::btree_map::Iter;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// 消息处理结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckState {
    Pending,
    Acked,
    Nacked,
}

/// 消息元数据（按键有序）
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, String, String> {
        self.0.iter()
    }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Clone, Debug)]
pub struct Message {
    uuid: String,
    metadata: Metadata,
    payload: Vec<u8>,
    context: MessageContext,
    outcome: Arc<watch::Sender<AckState>>,
}

impl Message {
    pub fn new(uuid: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        let (tx, _rx) = watch::channel(AckState::Pending);
        Self {
            uuid: uuid.into(),
            metadata: Metadata::default(),
            payload: payload.into(),
            context: MessageContext::default(),
            outcome: Arc::new(tx),
        }
    }

    /// 以随机 UUIDv4 作为消息标识创建消息
    pub fn with_random_uuid(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Uuid::new_v4().to_string(), payload)
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn context(&self) -> &MessageContext {
        &self.context
    }

    pub fn set_context(&mut self, context: MessageContext) {
        self.context = context;
    }

    /// 确认消息；仅首次写入生效，返回是否由本次调用写入
    pub fn ack(&self) -> bool {
        self.settle(AckState::Acked)
    }

    /// 拒绝消息；仅首次写入生效，返回是否由本次调用写入
    pub fn nack(&self) -> bool {
        self.settle(AckState::Nacked)
    }

    pub fn state(&self) -> AckState {
        *self.outcome.borrow()
    }

    /// 等待消息被确认（若消息被拒绝则永不返回）
    pub async fn acked(&self) {
        self.wait_for(AckState::Acked).await;
    }

    /// 等待消息被拒绝（若消息被确认则永不返回）
    pub async fn nacked(&self) {
        self.wait_for(AckState::Nacked).await;
    }

    /// 等待处理结果落定
    pub async fn outcome(&self) -> AckState {
        let mut rx = self.outcome.subscribe();
        let state = rx
            .wait_for(|s| *s != AckState::Pending)
            .await
            .map_or(AckState::Pending, |s| *s);
        state
    }

    /// 复制消息内容，生成拥有独立结果信号与默认上下文的新消息
    pub fn copy(&self) -> Self {
        let mut copied = Self::new(self.uuid.clone(), self.payload.clone());
        copied.metadata = self.metadata.clone();
        copied
    }

    fn settle(&self, state: AckState) -> bool {
        self.outcome.send_if_modified(|current| {
            if *current == AckState::Pending {
                *current = state;
                true
            } else {
                false
            }
        })
    }

    async fn wait_for(&self, state: AckState) {
        let mut rx = self.outcome.subscribe();
        // 发送端由 self 持有，等待期间不会关闭
        let _ = rx.wait_for(|s| *s == state).await;
    }
}
