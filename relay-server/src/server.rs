//! 服务器主逻辑
//!
//! 每条连接一个接收循环加一个写任务，全部共享状态由单把粗粒度锁保护。
//! 注册表变更和房间状态变更都在锁内完成，两个客户端同时抢同一个
//! 房间的最后一个座位、或抢同一回合走棋时，先拿到锁的一方生效。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;

use protocol::{
    Connection, ErrorCode, Listener, Message, PlayerId, ProtocolError, Result, RoomId,
    RoomStatus, Side, TcpConnection, TcpListener, MAX_ROOM_NAME_LEN,
};

use crate::config::ServerConfig;
use crate::player::{Player, PlayerManager};
use crate::room::RoomManager;

/// 每条连接的发送队列容量
const SEND_QUEUE_CAPACITY: usize = 32;

/// 关闭时等待后台任务退出的上限
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// 共享的服务器状态
pub type SharedState = Arc<Mutex<ServerState>>;

/// 服务器状态
pub struct ServerState {
    pub players: PlayerManager,
    pub rooms: RoomManager,
    /// 玩家 ID -> 消息发送通道（写任务是连接的唯一写者）
    pub connections: HashMap<PlayerId, mpsc::Sender<Message>>,
    /// 玩家 ID -> 最后一次心跳时间
    pub last_seen: HashMap<PlayerId, Instant>,
    /// 玩家 ID -> 强制断开信号（心跳巡检驱逐时使用）
    closers: HashMap<PlayerId, Arc<Notify>>,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            players: PlayerManager::new(),
            rooms: RoomManager::new(),
            connections: HashMap::new(),
            last_seen: HashMap::new(),
            closers: HashMap::new(),
        }
    }

    /// 发送消息给玩家
    pub async fn send_to_player(&self, player_id: &PlayerId, msg: Message) {
        if let Some(tx) = self.connections.get(player_id) {
            let _ = tx.send(msg).await;
        }
    }

    /// 广播消息给房间内双方
    pub async fn broadcast_to_room(&self, room_id: &RoomId, msg: Message) {
        if let Some(room) = self.rooms.get(room_id) {
            self.send_to_player(&room.host.id, msg.clone()).await;
            if let Some(guest) = &room.guest {
                self.send_to_player(&guest.id, msg).await;
            }
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// 待发送的消息
struct PendingMessages {
    messages: Vec<(PlayerId, Message)>,
    broadcasts: Vec<(RoomId, Message)>,
}

impl PendingMessages {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            broadcasts: Vec::new(),
        }
    }

    fn send(&mut self, player_id: PlayerId, msg: Message) {
        self.messages.push((player_id, msg));
    }

    fn broadcast(&mut self, room_id: RoomId, msg: Message) {
        self.broadcasts.push((room_id, msg));
    }

    async fn flush(self, state: &ServerState) {
        for (player_id, msg) in self.messages {
            state.send_to_player(&player_id, msg).await;
        }
        for (room_id, msg) in self.broadcasts {
            state.broadcast_to_room(&room_id, msg).await;
        }
    }
}

/// 错误码对应的提示文案
fn error_text(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::RoomNotFound => "房间不存在",
        ErrorCode::RoomFull => "房间已满",
        ErrorCode::RoomClosed => "房间不可加入",
        ErrorCode::WrongPassword => "密码错误",
        ErrorCode::NotInRoom => "不在房间中",
        ErrorCode::AlreadyInRoom => "已在房间中",
        ErrorCode::NotYourTurn => "不是你的回合",
        ErrorCode::GameNotStarted => "游戏未开始",
        ErrorCode::GameAlreadyOver => "游戏已结束",
        ErrorCode::InvalidName => "无效昵称",
        ErrorCode::PlayerNotFound => "玩家不存在",
        ErrorCode::InternalError => "内部错误",
    }
}

fn reject(code: ErrorCode) -> Message {
    Message::Error {
        code,
        message: error_text(code).to_string(),
    }
}

/// 消息处理器
pub struct MessageHandler;

impl MessageHandler {
    /// 处理客户端消息
    ///
    /// 返回值是要直接回给发送方的消息；发给其他玩家的消息先积累在
    /// PendingMessages 里，处理完统一发送。
    pub async fn handle(
        state: &mut ServerState,
        player_id: &PlayerId,
        msg: Message,
    ) -> Option<Message> {
        let mut pending = PendingMessages::new();

        let result = match msg {
            Message::CreateRoomRequest {
                room_name,
                password,
            } => Self::handle_create_room(state, player_id, room_name, password),
            Message::JoinRoomRequest { room_id, password } => {
                Self::handle_join_room(state, &mut pending, player_id, room_id, password)
            }
            Message::ListRooms => Self::handle_list_rooms(state),
            // 走棋与文字消息原样转发，身份以连接为准
            mv @ Message::Move { .. } => Self::handle_move(state, &mut pending, player_id, mv),
            text @ Message::TextMessage { .. } => {
                Self::handle_text(state, &mut pending, player_id, text)
            }
            Message::LeaveRoom { .. } => Self::handle_leave_room(state, &mut pending, player_id),
            Message::Heartbeat { .. } => Self::handle_heartbeat(state, player_id),
            Message::ConnectRequest { .. } => Some(Message::Error {
                code: ErrorCode::InternalError,
                message: "重复的连接请求".to_string(),
            }),
            other => {
                // 服务端专属消息不应来自客户端
                tracing::warn!("玩家 {} 发送了非法消息: {:?}", player_id, other);
                Some(reject(ErrorCode::InternalError))
            }
        };

        pending.flush(state).await;

        result
    }

    /// 处理创建房间
    fn handle_create_room(
        state: &mut ServerState,
        player_id: &PlayerId,
        room_name: String,
        password: Option<String>,
    ) -> Option<Message> {
        if state.players.room_of(player_id).is_some() {
            return Some(reject(ErrorCode::AlreadyInRoom));
        }
        let Some(name) = state.players.get_name(player_id).map(|s| s.to_string()) else {
            return Some(reject(ErrorCode::PlayerNotFound));
        };
        if room_name.trim().is_empty() || room_name.chars().count() > MAX_ROOM_NAME_LEN {
            return Some(Message::Error {
                code: ErrorCode::InvalidName,
                message: "房间名无效".to_string(),
            });
        }

        let host = Player::new(player_id.clone(), name);
        let room_id = state.rooms.create(room_name, password, host);
        state.players.set_room(player_id, Some(room_id.clone()));
        tracing::info!("玩家 {} 创建房间 {}", player_id, room_id);

        Some(Message::CreateRoomResponse {
            success: true,
            message: String::new(),
            room_id,
        })
    }

    /// 处理加入房间
    fn handle_join_room(
        state: &mut ServerState,
        pending: &mut PendingMessages,
        player_id: &PlayerId,
        room_id: RoomId,
        password: Option<String>,
    ) -> Option<Message> {
        if state.players.room_of(player_id).is_some() {
            return Some(reject(ErrorCode::AlreadyInRoom));
        }
        let Some(name) = state.players.get_name(player_id).map(|s| s.to_string()) else {
            return Some(reject(ErrorCode::PlayerNotFound));
        };

        // 检查房间是否可加入
        let Some(room) = state.rooms.get(&room_id) else {
            return Some(reject(ErrorCode::RoomNotFound));
        };
        if !room.validate_password(password.as_deref()) {
            return Some(reject(ErrorCode::WrongPassword));
        }
        if room.status != RoomStatus::Waiting {
            let code = if room.is_full() {
                ErrorCode::RoomFull
            } else {
                ErrorCode::RoomClosed
            };
            return Some(reject(code));
        }
        let host_name = room.host.name.clone();

        // 入座
        let room = state.rooms.get_mut(&room_id)?;
        if !room.add_player(Player::new(player_id.clone(), name.clone())) {
            return Some(reject(ErrorCode::RoomFull));
        }
        state.players.set_room(player_id, Some(room_id.clone()));
        tracing::info!("玩家 {} 加入房间 {}", player_id, room_id);

        // 先回执加入者，保证它先于 GameStart 到达
        pending.send(
            player_id.clone(),
            Message::JoinRoomResponse {
                success: true,
                message: String::new(),
                room_id: room_id.clone(),
                opponent_name: host_name,
            },
        );

        // 双方入座即视为就绪，立即开局；两端收到各自的 your_side
        let room = state.rooms.get_mut(&room_id)?;
        if room.start_game() {
            let side_a_name = room.host.name.clone();
            let side_b_name = name;
            pending.send(
                room.host.id.clone(),
                Message::GameStart {
                    side_a_name: side_a_name.clone(),
                    side_b_name: side_b_name.clone(),
                    your_side: Side::A,
                },
            );
            pending.send(
                player_id.clone(),
                Message::GameStart {
                    side_a_name,
                    side_b_name,
                    your_side: Side::B,
                },
            );
        }

        None
    }

    /// 处理房间列表
    fn handle_list_rooms(state: &ServerState) -> Option<Message> {
        let rooms = state
            .rooms
            .list_joinable()
            .iter()
            .map(|r| r.info())
            .collect();
        Some(Message::RoomList { rooms })
    }

    /// 处理走棋
    ///
    /// 回合仲裁通过后把原始 Move 转发给对手，再向双方广播服务端的
    /// 权威状态，两端即使本地逻辑有分歧也会向服务端收敛。被拒绝的
    /// 走棋只回错误给发送方，不产生任何广播。
    fn handle_move(
        state: &mut ServerState,
        pending: &mut PendingMessages,
        player_id: &PlayerId,
        mv: Message,
    ) -> Option<Message> {
        let Some(room_id) = state.players.room_of(player_id).cloned() else {
            return Some(reject(ErrorCode::NotInRoom));
        };
        let room = state.rooms.get_mut(&room_id)?;

        if let Err(code) = room.process_move(player_id) {
            return Some(reject(code));
        }

        let opponent_id = room.opponent(player_id)?.id.clone();
        pending.send(opponent_id, mv);

        pending.broadcast(
            room_id,
            Message::GameStateSync {
                board_snapshot: room.game_state.board_snapshot.clone(),
                current_player: room.game_state.current_player,
                is_game_over: room.game_state.is_game_over,
                winner: room.game_state.winner,
            },
        );

        None
    }

    /// 处理文字消息（原样转发给对手）
    fn handle_text(
        state: &mut ServerState,
        pending: &mut PendingMessages,
        player_id: &PlayerId,
        text: Message,
    ) -> Option<Message> {
        let Some(room_id) = state.players.room_of(player_id).cloned() else {
            return Some(reject(ErrorCode::NotInRoom));
        };
        let room = state.rooms.get(&room_id)?;
        let opponent_id = room.opponent(player_id)?.id.clone();
        pending.send(opponent_id, text);
        None
    }

    /// 处理离开房间
    fn handle_leave_room(
        state: &mut ServerState,
        pending: &mut PendingMessages,
        player_id: &PlayerId,
    ) -> Option<Message> {
        let Some(room_id) = state.players.room_of(player_id).cloned() else {
            return Some(reject(ErrorCode::NotInRoom));
        };
        Self::leave_room(state, pending, player_id, &room_id, "对方离开");
        None
    }

    /// 处理心跳：刷新活跃时间并回响
    fn handle_heartbeat(state: &mut ServerState, player_id: &PlayerId) -> Option<Message> {
        state.last_seen.insert(player_id.clone(), Instant::now());
        Some(Message::Heartbeat {
            timestamp: Utc::now().timestamp_millis(),
        })
    }

    /// 共用的离房清理
    ///
    /// LeaveRoom 消息、连接断开、心跳驱逐都走这里。房主离开解散
    /// 整个房间；加入者在对局中离开则房主获胜、房间保留。
    fn leave_room(
        state: &mut ServerState,
        pending: &mut PendingMessages,
        player_id: &PlayerId,
        room_id: &RoomId,
        reason: &str,
    ) {
        let Some(room) = state.rooms.get_mut(room_id) else {
            return;
        };
        let was_playing = room.status == RoomStatus::Playing;
        let host_id = room.host.id.clone();
        let dissolve = room.remove_player(player_id);
        let guest = room.guest.clone();

        if dissolve {
            if let Some(guest) = guest {
                let winner = if was_playing { Some(Side::B) } else { None };
                pending.send(
                    guest.id.clone(),
                    Message::GameEnd {
                        winner,
                        reason: reason.to_string(),
                    },
                );
                state.players.set_room(&guest.id, None);
            }
            state.rooms.remove(room_id);
            tracing::info!("房间 {} 已解散", room_id);
        } else if was_playing {
            pending.send(
                host_id,
                Message::GameEnd {
                    winner: Some(Side::A),
                    reason: reason.to_string(),
                },
            );
        }

        state.players.set_room(player_id, None);
    }

    /// 处理连接断开
    ///
    /// worker 退出和心跳驱逐都会调用；重复调用是无操作。
    pub async fn handle_disconnect(state: &mut ServerState, player_id: &PlayerId) {
        if state.connections.remove(player_id).is_none() {
            return;
        }
        state.last_seen.remove(player_id);
        state.closers.remove(player_id);

        let mut pending = PendingMessages::new();
        if let Some(room_id) = state.players.room_of(player_id).cloned() {
            Self::leave_room(state, &mut pending, player_id, &room_id, "对方断线");
        }
        state.players.remove(player_id);

        pending.flush(state).await;
    }
}

/// 中继服务器
pub struct RelayServer {
    config: ServerConfig,
    state: SharedState,
    running: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    local_addr: Option<String>,
    accept_task: Option<JoinHandle<()>>,
    sweep_task: Option<JoinHandle<()>>,
}

impl RelayServer {
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            state: Arc::new(Mutex::new(ServerState::new())),
            running: Arc::new(AtomicBool::new(false)),
            shutdown,
            local_addr: None,
            accept_task: None,
            sweep_task: None,
        }
    }

    /// 启动服务
    ///
    /// 绑定监听地址（端口被占用是致命错误，同步报告给调用方），
    /// 然后启动接受循环和心跳巡检两个后台任务。
    pub async fn start(&mut self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.local_addr = listener.local_addr();
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("中继服务已启动: {:?}", self.local_addr);

        self.accept_task = Some(tokio::spawn(accept_loop(
            listener,
            self.state.clone(),
            self.running.clone(),
            self.shutdown.subscribe(),
            self.config.max_connections,
        )));
        self.sweep_task = Some(tokio::spawn(liveness_sweep(
            self.state.clone(),
            self.running.clone(),
            self.shutdown.subscribe(),
            self.config.heartbeat_interval(),
            self.config.heartbeat_timeout(),
        )));

        Ok(())
    }

    /// 停止服务
    ///
    /// 向所有对端发送 Disconnect，通知各循环退出，再有界等待
    /// 后台任务收敛。
    pub async fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!("中继服务正在关闭...");

        {
            let state = self.state.lock().await;
            for tx in state.connections.values() {
                let _ = tx
                    .send(Message::Disconnect {
                        reason: "服务器关闭".to_string(),
                    })
                    .await;
            }
            for closer in state.closers.values() {
                closer.notify_one();
            }
        }
        let _ = self.shutdown.send(true);

        for task in [self.accept_task.take(), self.sweep_task.take()]
            .into_iter()
            .flatten()
        {
            let abort = task.abort_handle();
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err() {
                tracing::warn!("后台任务未能及时退出，强制终止");
                abort.abort();
            }
        }

        // 等待各连接 worker 完成清理
        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        while Instant::now() < deadline {
            if self.state.lock().await.connections.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tracing::info!("中继服务已停止");
    }

    /// 实际监听地址（端口 0 绑定后由系统分配）
    pub fn local_addr(&self) -> Option<&str> {
        self.local_addr.as_deref()
    }

    /// 是否正在运行
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 当前连接的客户端数量
    pub async fn client_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    /// 当前活跃房间数量
    pub async fn room_count(&self) -> usize {
        self.state.lock().await.rooms.count()
    }
}

/// 接受循环：每接受一条连接就派生一个 worker
async fn accept_loop(
    mut listener: TcpListener,
    state: SharedState,
    running: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
    max_connections: usize,
) {
    loop {
        let conn = tokio::select! {
            res = listener.accept() => match res {
                Ok(conn) => conn,
                Err(e) => {
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    tracing::warn!("接受连接失败: {}", e);
                    continue;
                }
            },
            _ = shutdown.changed() => break,
        };
        if !running.load(Ordering::SeqCst) {
            break;
        }

        tokio::spawn(serve_connection(
            conn,
            state.clone(),
            shutdown.clone(),
            max_connections,
        ));
    }
    tracing::debug!("接受循环退出");
}

/// 单条连接的 worker
///
/// 握手成功后分成两个任务：本函数继续跑接收循环，写任务独占写端、
/// 从发送队列逐条写出。任何传输或协议错误只影响本连接。
async fn serve_connection(
    conn: TcpConnection,
    state: SharedState,
    mut shutdown: watch::Receiver<bool>,
    max_connections: usize,
) {
    let peer = conn.peer_addr().unwrap_or_else(|| "未知".to_string());
    let (mut reader, mut writer) = conn.split();

    // 握手：第一条消息必须是 ConnectRequest
    let hello = tokio::select! {
        res = reader.read_frame() => res,
        _ = shutdown.changed() => return,
    };
    let display_name = match hello {
        Ok(Message::ConnectRequest { display_name }) => display_name,
        Ok(_) => {
            tracing::warn!("{} 未握手先发送其他消息，关闭连接", peer);
            let _ = writer.write_frame(&reject(ErrorCode::PlayerNotFound)).await;
            return;
        }
        Err(e) => {
            tracing::debug!("{} 握手失败: {}", peer, e);
            return;
        }
    };

    // 注册玩家并建立发送队列
    let (player_id, tx, rx, closer) = {
        let mut st = state.lock().await;
        if st.connections.len() >= max_connections {
            drop(st);
            tracing::warn!("{} 被拒绝：连接数已达上限", peer);
            let _ = writer
                .write_frame(&Message::ConnectResponse {
                    success: false,
                    message: "服务器已满".to_string(),
                    player_id: String::new(),
                })
                .await;
            return;
        }
        match st.players.register(display_name) {
            Ok(id) => {
                let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
                let closer = Arc::new(Notify::new());
                st.connections.insert(id.clone(), tx.clone());
                st.last_seen.insert(id.clone(), Instant::now());
                st.closers.insert(id.clone(), closer.clone());
                (id, tx, rx, closer)
            }
            Err(msg) => {
                drop(st);
                let _ = writer
                    .write_frame(&Message::ConnectResponse {
                        success: false,
                        message: msg.to_string(),
                        player_id: String::new(),
                    })
                    .await;
                return;
            }
        }
    };

    // 握手回执
    if writer
        .write_frame(&Message::ConnectResponse {
            success: true,
            message: "欢迎".to_string(),
            player_id: player_id.clone(),
        })
        .await
        .is_err()
    {
        let mut st = state.lock().await;
        MessageHandler::handle_disconnect(&mut st, &player_id).await;
        return;
    }
    tracing::info!("玩家 {} ({}) 已连接", player_id, peer);

    // 写任务：该连接的唯一写者
    let writer_task = tokio::spawn(async move {
        let mut rx = rx;
        let mut writer = writer;
        while let Some(msg) = rx.recv().await {
            if let Err(e) = writer.write_frame(&msg).await {
                tracing::debug!("写入失败: {}", e);
                break;
            }
        }
    });

    // 接收循环
    loop {
        let msg = tokio::select! {
            res = reader.read_frame() => match res {
                Ok(msg) => msg,
                Err(ProtocolError::ConnectionClosed) => {
                    tracing::debug!("玩家 {} 连接关闭", player_id);
                    break;
                }
                Err(e) => {
                    tracing::warn!("玩家 {} 协议错误: {}，关闭连接", player_id, e);
                    break;
                }
            },
            _ = closer.notified() => {
                tracing::debug!("玩家 {} 被强制断开", player_id);
                break;
            }
            _ = shutdown.changed() => break,
        };

        if let Message::Disconnect { reason } = msg {
            tracing::info!("玩家 {} 主动断开: {}", player_id, reason);
            break;
        }

        let reply = {
            let mut st = state.lock().await;
            MessageHandler::handle(&mut st, &player_id, msg).await
        };
        if let Some(reply) = reply {
            if tx.send(reply).await.is_err() {
                break;
            }
        }
    }

    // 清理（若已被巡检任务清理则为无操作）
    {
        let mut st = state.lock().await;
        MessageHandler::handle_disconnect(&mut st, &player_id).await;
    }
    drop(tx);
    let _ = writer_task.await;
    tracing::info!("玩家 {} 会话结束", player_id);
}

/// 心跳巡检
///
/// 每个周期检查所有连接的最后心跳时间：超时的强制断开（与正常断线
/// 走同一条清理路径），存活的主动发一个心跳过去。
async fn liveness_sweep(
    state: SharedState,
    running: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
    interval: Duration,
    heartbeat_timeout: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    // interval 的第一次 tick 立即完成，先消耗掉
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let mut st = state.lock().await;
        let now = Instant::now();
        let expired: Vec<PlayerId> = st
            .last_seen
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) > heartbeat_timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for player_id in expired {
            tracing::warn!("玩家 {} 心跳超时，强制断开", player_id);
            let closer = st.closers.get(&player_id).cloned();
            MessageHandler::handle_disconnect(&mut st, &player_id).await;
            if let Some(closer) = closer {
                closer.notify_one();
            }
        }

        // 对存活连接主动发送心跳；队列已满就跳过这一轮
        let timestamp = Utc::now().timestamp_millis();
        for tx in st.connections.values() {
            let _ = tx.try_send(Message::Heartbeat { timestamp });
        }
    }
    tracing::debug!("心跳巡检退出");
}
