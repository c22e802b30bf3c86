//! 中继客户端
//!
//! 连接成功后运行两个并发任务：接收循环把服务端消息分发成
//! [`ClientEvent`]，心跳循环定期发送心跳并检测服务端失活。
//! 所有出站写入（业务消息与心跳）都经过同一把写锁，保证任何
//! 时刻只有一个写者。

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, Mutex};

use protocol::{
    Connector, ErrorCode, FrameReader, FrameWriter, Message, PlayerId, ProtocolError, Result,
    RoomId, RoomInfo, Side, TcpConnector, CLIENT_HEARTBEAT_TIMEOUT, CONNECT_TIMEOUT,
    HEARTBEAT_INTERVAL, RECONNECT_DELAY,
};

/// 事件通道容量
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// 客户端事件
///
/// UI 层从事件接收端轮询或 await 这些事件，自行决定呈现方式。
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// 连接并握手成功
    Connected { player_id: PlayerId },
    /// 连接建立失败（含重连失败）
    ConnectionError { message: String },
    /// 房间创建成功
    RoomCreated { room_id: RoomId },
    /// 加入房间成功
    RoomJoined {
        room_id: RoomId,
        opponent_name: String,
    },
    /// 房间列表
    RoomList { rooms: Vec<RoomInfo> },
    /// 游戏开始
    GameStarted {
        side_a_name: String,
        side_b_name: String,
        your_side: Side,
    },
    /// 收到对手走棋
    MoveReceived {
        from_row: u8,
        from_col: u8,
        to_row: u8,
        to_col: u8,
    },
    /// 服务端权威状态同步
    GameStateUpdate {
        board_snapshot: String,
        current_player: Side,
        is_game_over: bool,
        winner: Option<Side>,
    },
    /// 游戏结束
    GameEnded {
        winner: Option<Side>,
        reason: String,
    },
    /// 收到文字消息
    ChatReceived { sender: String, content: String },
    /// 服务端返回的业务错误
    ServerError { code: ErrorCode, message: String },
    /// 本地错误（未连接、发送失败等）
    Error { message: String },
    /// 连接断开
    Disconnected { reason: String },
}

/// 重连策略
///
/// `max_attempts` 为 None 时无限重试（固定延迟、不做退避）。
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// 每次重连前的等待时间
    pub delay: Duration,
    /// 最大重连次数（None = 不限）
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: RECONNECT_DELAY,
            max_attempts: None,
        }
    }
}

/// 客户端配置
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// 心跳发送间隔
    pub heartbeat_interval: Duration,
    /// 服务端心跳超时 - 超过此时间未收到服务端心跳视为断线
    pub heartbeat_timeout: Duration,
    /// 重连策略（None = 断线后不自动重连）
    pub reconnect: Option<ReconnectPolicy>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: HEARTBEAT_INTERVAL,
            heartbeat_timeout: CLIENT_HEARTBEAT_TIMEOUT,
            reconnect: Some(ReconnectPolicy::default()),
        }
    }
}

/// 客户端句柄与后台任务共享的状态
struct ClientShared {
    config: ClientConfig,
    events: mpsc::Sender<ClientEvent>,
    /// 出站写端：业务发送和心跳发送共用，写锁保证单写者
    writer: Mutex<Option<FrameWriter<OwnedWriteHalf>>>,
    connected: AtomicBool,
    /// 客户端主动断开后关闭自动重连
    auto_reconnect: AtomicBool,
    /// 已尝试的重连次数（连接成功后清零）
    attempts: AtomicU32,
    /// 连接世代号：旧连接残留的任务据此自行退出
    generation: AtomicU64,
    player_id: StdMutex<Option<PlayerId>>,
    /// 最后一次收到服务端心跳的时间
    last_heartbeat: StdMutex<Instant>,
    /// 连接目标（地址 + 昵称），重连时复用
    target: StdMutex<Option<(String, String)>>,
}

impl ClientShared {
    /// 通过写锁发送一条消息
    async fn send(&self, msg: &Message) -> Result<()> {
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => writer.write_frame(msg).await,
            None => Err(ProtocolError::NotConnected),
        }
    }

    /// 建立连接并完成握手，成功后启动接收循环和心跳循环
    async fn establish(shared: &Arc<Self>) -> Result<()> {
        let (addr, name) = shared
            .target
            .lock()
            .unwrap()
            .clone()
            .ok_or(ProtocolError::NotConnected)?;

        let conn = TcpConnector.connect(&addr).await?;
        let (mut reader, mut writer) = conn.split();

        writer
            .write_frame(&Message::ConnectRequest {
                display_name: name.clone(),
            })
            .await?;
        let resp = tokio::time::timeout(CONNECT_TIMEOUT, reader.read_frame())
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout)??;

        match resp {
            Message::ConnectResponse {
                success: true,
                player_id,
                ..
            } => {
                *shared.player_id.lock().unwrap() = Some(player_id.clone());
                *shared.last_heartbeat.lock().unwrap() = Instant::now();
                *shared.writer.lock().await = Some(writer);
                shared.attempts.store(0, Ordering::SeqCst);
                shared.connected.store(true, Ordering::SeqCst);
                let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

                tracing::info!("已连接到 {}，玩家 ID: {}", addr, player_id);
                let _ = shared
                    .events
                    .send(ClientEvent::Connected { player_id })
                    .await;

                tokio::spawn(Self::receive_loop(shared.clone(), reader, generation));
                tokio::spawn(Self::heartbeat_loop(shared.clone(), generation));
                Ok(())
            }
            Message::ConnectResponse {
                success: false,
                message,
                ..
            } => Err(ProtocolError::HandshakeRejected(message)),
            _ => Err(ProtocolError::HandshakeRejected(
                "服务端响应异常".to_string(),
            )),
        }
    }

    /// 接收循环：按消息类型分发事件
    ///
    /// IO 错误和服务端的 Disconnect 消息都汇入同一个断线处理。
    async fn receive_loop(
        shared: Arc<Self>,
        mut reader: FrameReader<OwnedReadHalf>,
        generation: u64,
    ) {
        loop {
            let msg = match reader.read_frame().await {
                Ok(msg) => msg,
                Err(e) => {
                    Self::handle_disconnection(&shared, generation, format!("连接中断: {}", e), false)
                        .await;
                    break;
                }
            };
            if shared.generation.load(Ordering::SeqCst) != generation {
                break;
            }

            match msg {
                Message::Heartbeat { .. } => {
                    *shared.last_heartbeat.lock().unwrap() = Instant::now();
                }
                Message::Disconnect { reason } => {
                    Self::handle_disconnection(&shared, generation, reason, false).await;
                    break;
                }
                msg => Self::dispatch(&shared, msg).await,
            }
        }
    }

    /// 把服务端消息翻译成客户端事件
    async fn dispatch(shared: &Arc<Self>, msg: Message) {
        let event = match msg {
            Message::CreateRoomResponse {
                success: true,
                room_id,
                ..
            } => ClientEvent::RoomCreated { room_id },
            Message::CreateRoomResponse {
                success: false,
                message,
                ..
            } => ClientEvent::Error { message },
            Message::JoinRoomResponse {
                success: true,
                room_id,
                opponent_name,
                ..
            } => ClientEvent::RoomJoined {
                room_id,
                opponent_name,
            },
            Message::JoinRoomResponse {
                success: false,
                message,
                ..
            } => ClientEvent::Error { message },
            Message::RoomList { rooms } => ClientEvent::RoomList { rooms },
            Message::GameStart {
                side_a_name,
                side_b_name,
                your_side,
            } => ClientEvent::GameStarted {
                side_a_name,
                side_b_name,
                your_side,
            },
            Message::Move {
                from_row,
                from_col,
                to_row,
                to_col,
                ..
            } => ClientEvent::MoveReceived {
                from_row,
                from_col,
                to_row,
                to_col,
            },
            Message::GameStateSync {
                board_snapshot,
                current_player,
                is_game_over,
                winner,
            } => ClientEvent::GameStateUpdate {
                board_snapshot,
                current_player,
                is_game_over,
                winner,
            },
            Message::GameEnd { winner, reason } => ClientEvent::GameEnded { winner, reason },
            Message::Error { code, message } => ClientEvent::ServerError { code, message },
            Message::TextMessage {
                sender, content, ..
            } => ClientEvent::ChatReceived { sender, content },
            other => {
                tracing::debug!("忽略意外消息: {:?}", other);
                return;
            }
        };
        let _ = shared.events.send(event).await;
    }

    /// 心跳循环：定期发送心跳，并检测服务端是否失活
    async fn heartbeat_loop(shared: Arc<Self>, generation: u64) {
        let mut ticker = tokio::time::interval(shared.config.heartbeat_interval);
        // interval 的第一次 tick 立即完成，先消耗掉
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if shared.generation.load(Ordering::SeqCst) != generation
                || !shared.connected.load(Ordering::SeqCst)
            {
                break;
            }

            let silence = shared.last_heartbeat.lock().unwrap().elapsed();
            if silence > shared.config.heartbeat_timeout {
                Self::handle_disconnection(&shared, generation, "心跳超时".to_string(), false)
                    .await;
                break;
            }

            let msg = Message::Heartbeat {
                timestamp: Utc::now().timestamp_millis(),
            };
            if let Err(e) = shared.send(&msg).await {
                tracing::debug!("心跳发送失败: {}", e);
            }
        }
    }

    /// 统一的断线处理
    ///
    /// 对同一个连接世代只生效一次：标记断开、释放写端、发出
    /// Disconnected 事件，非主动断开时按策略安排重连。
    async fn handle_disconnection(
        shared: &Arc<Self>,
        generation: u64,
        reason: String,
        client_initiated: bool,
    ) {
        if shared.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        if shared
            .connected
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        *shared.writer.lock().await = None;
        *shared.player_id.lock().unwrap() = None;
        tracing::info!("连接已断开: {}", reason);
        let _ = shared.events.send(ClientEvent::Disconnected { reason }).await;

        if !client_initiated && shared.auto_reconnect.load(Ordering::SeqCst) {
            Self::schedule_reconnect(shared);
        }
    }

    /// 按策略安排一次重连
    fn schedule_reconnect(shared: &Arc<Self>) {
        let Some(policy) = shared.config.reconnect.clone() else {
            return;
        };
        let attempt = shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(max) = policy.max_attempts {
            if attempt > max {
                tracing::warn!("重连 {} 次均失败，放弃", max);
                return;
            }
        }

        let shared = shared.clone();
        tokio::spawn(async move {
            tokio::time::sleep(policy.delay).await;
            if shared.connected.load(Ordering::SeqCst)
                || !shared.auto_reconnect.load(Ordering::SeqCst)
            {
                return;
            }
            tracing::info!("第 {} 次重连...", attempt);
            if let Err(e) = Self::establish(&shared).await {
                let _ = shared
                    .events
                    .send(ClientEvent::ConnectionError {
                        message: e.to_string(),
                    })
                    .await;
                Self::schedule_reconnect(&shared);
            }
        });
    }
}

/// 中继客户端句柄
pub struct RelayClient {
    shared: Arc<ClientShared>,
}

impl RelayClient {
    /// 创建客户端，返回句柄和事件接收端
    pub fn new(config: ClientConfig) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (events, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(ClientShared {
            config,
            events,
            writer: Mutex::new(None),
            connected: AtomicBool::new(false),
            auto_reconnect: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            player_id: StdMutex::new(None),
            last_heartbeat: StdMutex::new(Instant::now()),
            target: StdMutex::new(None),
        });
        (Self { shared }, rx)
    }

    /// 连接服务器并握手
    ///
    /// 失败时发出 ConnectionError 事件；配置了重连策略的话随即
    /// 安排重试。
    pub async fn connect(&self, addr: &str, display_name: &str) -> Result<()> {
        if self.shared.connected.load(Ordering::SeqCst) {
            tracing::warn!("已连接，忽略重复的 connect 调用");
            return Ok(());
        }

        *self.shared.target.lock().unwrap() =
            Some((addr.to_string(), display_name.to_string()));
        self.shared.auto_reconnect.store(true, Ordering::SeqCst);
        self.shared.attempts.store(0, Ordering::SeqCst);

        match ClientShared::establish(&self.shared).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = self
                    .shared
                    .events
                    .send(ClientEvent::ConnectionError {
                        message: e.to_string(),
                    })
                    .await;
                ClientShared::schedule_reconnect(&self.shared);
                Err(e)
            }
        }
    }

    /// 创建房间
    pub async fn create_room(&self, room_name: &str, password: Option<String>) -> Result<()> {
        self.send_checked(Message::CreateRoomRequest {
            room_name: room_name.to_string(),
            password,
        })
        .await
    }

    /// 加入房间
    pub async fn join_room(&self, room_id: &str, password: Option<String>) -> Result<()> {
        self.send_checked(Message::JoinRoomRequest {
            room_id: room_id.to_string(),
            password,
        })
        .await
    }

    /// 离开当前房间
    pub async fn leave_room(&self) -> Result<()> {
        let Some(player_id) = self.player_id() else {
            return self.report_not_connected().await;
        };
        self.send_checked(Message::LeaveRoom { player_id }).await
    }

    /// 请求房间列表
    pub async fn list_rooms(&self) -> Result<()> {
        self.send_checked(Message::ListRooms).await
    }

    /// 发送走棋
    ///
    /// 走法合法性由调用方的游戏规则在发送前验证，这里只负责传输。
    pub async fn send_move(
        &self,
        from_row: u8,
        from_col: u8,
        to_row: u8,
        to_col: u8,
    ) -> Result<()> {
        self.send_checked(Message::Move {
            from_row,
            from_col,
            to_row,
            to_col,
            timestamp: Utc::now().timestamp_millis(),
        })
        .await
    }

    /// 发送文字消息
    pub async fn send_chat(&self, content: &str) -> Result<()> {
        let sender = self
            .shared
            .target
            .lock()
            .unwrap()
            .as_ref()
            .map(|(_, name)| name.clone())
            .unwrap_or_default();
        self.send_checked(Message::TextMessage {
            sender,
            content: content.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        })
        .await
    }

    /// 客户端主动断开
    ///
    /// 关闭自动重连，尽力通知服务端，然后同步释放本地资源。
    pub async fn disconnect(&self) {
        self.shared.auto_reconnect.store(false, Ordering::SeqCst);
        let _ = self
            .shared
            .send(&Message::Disconnect {
                reason: "客户端主动断开".to_string(),
            })
            .await;
        let generation = self.shared.generation.load(Ordering::SeqCst);
        ClientShared::handle_disconnection(
            &self.shared,
            generation,
            "客户端主动断开".to_string(),
            true,
        )
        .await;
    }

    /// 是否已连接
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// 握手分配的玩家 ID
    pub fn player_id(&self) -> Option<PlayerId> {
        self.shared.player_id.lock().unwrap().clone()
    }

    /// 未连接时快速失败：发出本地错误事件并返回错误，不做连接排队
    async fn send_checked(&self, msg: Message) -> Result<()> {
        if !self.is_connected() {
            return self.report_not_connected().await;
        }
        match self.shared.send(&msg).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = self
                    .shared
                    .events
                    .send(ClientEvent::Error {
                        message: format!("发送失败: {}", e),
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn report_not_connected(&self) -> Result<()> {
        let _ = self
            .shared
            .events
            .send(ClientEvent::Error {
                message: "未连接到服务器".to_string(),
            })
            .await;
        Err(ProtocolError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use relay_server::{RelayServer, ServerConfig};

    async fn start_server() -> (RelayServer, String) {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            heartbeat_interval_ms: 10_000,
            heartbeat_timeout_ms: 30_000,
            max_connections: 16,
        };
        let mut server = RelayServer::new(config);
        server.start().await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        (server, addr)
    }

    fn test_client() -> (RelayClient, mpsc::Receiver<ClientEvent>) {
        RelayClient::new(ClientConfig {
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(60),
            reconnect: None,
        })
    }

    async fn next_event(rx: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("等待事件超时")
            .expect("事件通道已关闭")
    }

    #[tokio::test]
    async fn test_full_match_through_events() {
        let (mut server, addr) = start_server().await;

        // A 连接并建房
        let (a, mut a_events) = test_client();
        a.connect(&addr, "甲").await.unwrap();
        assert!(matches!(
            next_event(&mut a_events).await,
            ClientEvent::Connected { .. }
        ));

        a.create_room("R1", None).await.unwrap();
        let room_id = match next_event(&mut a_events).await {
            ClientEvent::RoomCreated { room_id } => room_id,
            other => panic!("Unexpected event: {:?}", other),
        };

        // B 连接，先看房间列表再加入
        let (b, mut b_events) = test_client();
        b.connect(&addr, "乙").await.unwrap();
        assert!(matches!(
            next_event(&mut b_events).await,
            ClientEvent::Connected { .. }
        ));

        b.list_rooms().await.unwrap();
        match next_event(&mut b_events).await {
            ClientEvent::RoomList { rooms } => {
                assert_eq!(rooms.len(), 1);
                assert_eq!(rooms[0].name, "R1");
            }
            other => panic!("Unexpected event: {:?}", other),
        }

        b.join_room(&room_id, None).await.unwrap();
        match next_event(&mut b_events).await {
            ClientEvent::RoomJoined { opponent_name, .. } => assert_eq!(opponent_name, "甲"),
            other => panic!("Unexpected event: {:?}", other),
        }
        match next_event(&mut b_events).await {
            ClientEvent::GameStarted { your_side, .. } => assert_eq!(your_side, Side::B),
            other => panic!("Unexpected event: {:?}", other),
        }
        match next_event(&mut a_events).await {
            ClientEvent::GameStarted { your_side, .. } => assert_eq!(your_side, Side::A),
            other => panic!("Unexpected event: {:?}", other),
        }

        // A 走棋：B 收到走法和状态同步，A 也收到状态同步
        a.send_move(0, 0, 1, 0).await.unwrap();
        match next_event(&mut b_events).await {
            ClientEvent::MoveReceived {
                from_row,
                from_col,
                to_row,
                to_col,
            } => {
                assert_eq!((from_row, from_col, to_row, to_col), (0, 0, 1, 0));
            }
            other => panic!("Unexpected event: {:?}", other),
        }
        match next_event(&mut b_events).await {
            ClientEvent::GameStateUpdate { current_player, .. } => {
                assert_eq!(current_player, Side::B)
            }
            other => panic!("Unexpected event: {:?}", other),
        }
        match next_event(&mut a_events).await {
            ClientEvent::GameStateUpdate { current_player, .. } => {
                assert_eq!(current_player, Side::B)
            }
            other => panic!("Unexpected event: {:?}", other),
        }

        // 文字消息原样转发
        a.send_chat("快点走").await.unwrap();
        match next_event(&mut b_events).await {
            ClientEvent::ChatReceived { sender, content } => {
                assert_eq!(sender, "甲");
                assert_eq!(content, "快点走");
            }
            other => panic!("Unexpected event: {:?}", other),
        }

        // B 离开，A 收到获胜通知
        b.leave_room().await.unwrap();
        match next_event(&mut a_events).await {
            ClientEvent::GameEnded { winner, .. } => assert_eq!(winner, Some(Side::A)),
            other => panic!("Unexpected event: {:?}", other),
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn test_server_error_surfaced() {
        let (mut server, addr) = start_server().await;

        let (client, mut events) = test_client();
        client.connect(&addr, "甲").await.unwrap();
        let _ = next_event(&mut events).await; // Connected

        client.join_room("00000000", None).await.unwrap();
        match next_event(&mut events).await {
            ClientEvent::ServerError { code, .. } => assert_eq!(code, ErrorCode::RoomNotFound),
            other => panic!("Unexpected event: {:?}", other),
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn test_fail_fast_when_not_connected() {
        let (client, mut events) = test_client();

        let err = client.create_room("R1", None).await.unwrap_err();
        assert!(matches!(err, ProtocolError::NotConnected));
        assert!(matches!(
            next_event(&mut events).await,
            ClientEvent::Error { .. }
        ));

        let err = client.send_move(0, 0, 1, 0).await.unwrap_err();
        assert!(matches!(err, ProtocolError::NotConnected));
    }

    #[tokio::test]
    async fn test_client_disconnect_reports_once_without_reconnect() {
        let (mut server, addr) = start_server().await;

        // 配置了重连策略，但主动断开不应触发重连
        let (client, mut events) = RelayClient::new(ClientConfig {
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(60),
            reconnect: Some(ReconnectPolicy {
                delay: Duration::from_millis(50),
                max_attempts: None,
            }),
        });
        client.connect(&addr, "甲").await.unwrap();
        let _ = next_event(&mut events).await; // Connected

        client.disconnect().await;
        assert!(!client.is_connected());
        assert!(matches!(
            next_event(&mut events).await,
            ClientEvent::Disconnected { .. }
        ));

        // 之后不应再有任何事件（尤其不应重连）
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(events.try_recv().is_err());

        server.stop().await;
    }

    #[tokio::test]
    async fn test_reconnect_attempts_capped() {
        // 占住一个端口再释放，得到一个确定拒绝连接的地址
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let (client, mut events) = RelayClient::new(ClientConfig {
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(60),
            reconnect: Some(ReconnectPolicy {
                delay: Duration::from_millis(50),
                max_attempts: Some(2),
            }),
        });

        assert!(client.connect(&addr, "甲").await.is_err());

        // 首次失败 + 两次重连失败 = 三个 ConnectionError
        for _ in 0..3 {
            assert!(matches!(
                next_event(&mut events).await,
                ClientEvent::ConnectionError { .. }
            ));
        }

        // 次数用尽后不再尝试
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(events.try_recv().is_err());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_heartbeat_timeout_detected_once() {
        // 手写一个完成握手后保持沉默的服务端
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let conn = protocol::TcpConnection::from_stream(stream).unwrap();
            let (mut reader, mut writer) = conn.split();
            if let Ok(Message::ConnectRequest { .. }) = reader.read_frame().await {
                let _ = writer
                    .write_frame(&Message::ConnectResponse {
                        success: true,
                        message: String::new(),
                        player_id: "p1".to_string(),
                    })
                    .await;
            }
            // 之后只收不发
            while reader.read_frame().await.is_ok() {}
        });

        let (client, mut events) = RelayClient::new(ClientConfig {
            heartbeat_interval: Duration::from_millis(50),
            heartbeat_timeout: Duration::from_millis(120),
            reconnect: None,
        });
        client.connect(&addr, "甲").await.unwrap();
        let _ = next_event(&mut events).await; // Connected

        match next_event(&mut events).await {
            ClientEvent::Disconnected { reason } => assert!(reason.contains("心跳")),
            other => panic!("Unexpected event: {:?}", other),
        }
        assert!(!client.is_connected());

        // 断线只报告一次
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(events.try_recv().is_err());
    }
}
