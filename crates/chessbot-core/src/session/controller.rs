//! Per-room game state machine.
//!
//! `NoGame | ActiveGame` x classified input -> render, redact, reply, persist.
//! The controller assumes its caller serializes calls per room (see
//! `dispatch::RoomDispatcher`); it does no locking of its own.

use std::sync::Arc;

use chessbot_types::command::{BotCommand, Classification};
use chessbot_types::event::InboundMessage;
use chessbot_types::game::GameSession;
use chessbot_types::ids::{EventId, RoomId, UserId};
use chrono::Utc;
use shakmaty::{Board, Position, Square};
use tracing::{debug, error, info, warn};

use crate::chess::{BoardRenderer, ChessGame, RenderedDiagram};
use crate::command::CommandClassifier;
use crate::delivery::DeliveryPipeline;
use crate::repository::{RoomStateStore, SessionStore};
use crate::transport::{RoomCrypto, Transport};

use super::help::help_content;
use super::outcome::{HandleOutcome, NoOpReason, ReplyKind};

pub struct GameController<S, T, C, R> {
    own_user: UserId,
    classifier: CommandClassifier,
    sessions: Arc<S>,
    delivery: Arc<DeliveryPipeline<T, C, R>>,
    renderer: Arc<dyn BoardRenderer>,
    version: String,
    source_url: Option<String>,
}

impl<S, T, C, R> GameController<S, T, C, R>
where
    S: SessionStore,
    T: Transport,
    C: RoomCrypto,
    R: RoomStateStore,
{
    pub fn new(
        own_user: UserId,
        sessions: Arc<S>,
        delivery: Arc<DeliveryPipeline<T, C, R>>,
        renderer: Arc<dyn BoardRenderer>,
        version: impl Into<String>,
    ) -> Self {
        let localpart = own_user.localpart().unwrap_or(own_user.as_str()).to_string();
        Self {
            classifier: CommandClassifier::new(localpart),
            own_user,
            sessions,
            delivery,
            renderer,
            version: version.into(),
            source_url: None,
        }
    }

    /// Link shown at the end of the help notice.
    pub fn with_source_url(mut self, source_url: Option<String>) -> Self {
        self.source_url = source_url;
        self
    }

    /// Handle one room message and acknowledge it as read.
    ///
    /// Never fails: every path ends in a [`HandleOutcome`].
    pub async fn handle(&self, message: &InboundMessage) -> HandleOutcome {
        let outcome = if message.sender == self.own_user {
            HandleOutcome::Ignored(NoOpReason::OwnMessage)
        } else {
            self.dispatch(message).await
        };

        self.delivery.mark_read(&message.room_id, &message.event_id).await;
        debug!(
            room_id = %message.room_id,
            event_id = %message.event_id,
            %outcome,
            "handled message"
        );
        outcome
    }

    async fn dispatch(&self, message: &InboundMessage) -> HandleOutcome {
        let room_id = &message.room_id;
        let session = match self.sessions.get(room_id).await {
            Ok(session) => session.filter(GameSession::is_active),
            Err(error) => {
                warn!(room_id = %room_id, %error, "could not read game session");
                None
            }
        };

        let classification = self.classifier.classify(&message.body, session.is_some());
        let source = message.logical_event_id();

        if message.replaces.is_some() {
            return self.handle_edit(room_id, source, classification).await;
        }

        match classification {
            Classification::Command { name, .. } => match BotCommand::from_name(&name) {
                BotCommand::New => self.new_game(room_id).await,
                BotCommand::Help => self.send_help(room_id).await,
            },
            Classification::PositionImport(fen) => {
                self.show_position(room_id, source, &fen).await
            }
            Classification::MoveAttempt(text) => match session {
                Some(session) => self.play_move(session, &text).await,
                None => HandleOutcome::Ignored(NoOpReason::NoActiveGame),
            },
            Classification::NotApplicable => HandleOutcome::Ignored(NoOpReason::NotApplicable),
        }
    }

    /// Edits only re-import positions. Whatever the new text says, the
    /// diagram produced for the original message is redacted first.
    async fn handle_edit(
        &self,
        room_id: &RoomId,
        original: &EventId,
        classification: Classification,
    ) -> HandleOutcome {
        match self.sessions.get_diagram_for_source(room_id, original).await {
            Ok(Some(previous)) => self.delivery.redact(room_id, &previous).await,
            Ok(None) => {}
            Err(error) => {
                warn!(room_id = %room_id, source_event_id = %original, %error, "could not look up diagram")
            }
        }

        match classification {
            Classification::PositionImport(fen) => self.show_position(room_id, original, &fen).await,
            _ => HandleOutcome::Ignored(NoOpReason::NotApplicable),
        }
    }

    async fn new_game(&self, room_id: &RoomId) -> HandleOutcome {
        let started = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let game = ChessGame::new().with_tag("Event", format!("{room_id} @ {started}"));

        let diagram = match self.render(game.position().board(), &[]) {
            Ok(diagram) => diagram,
            Err(reason) => return HandleOutcome::Ignored(reason),
        };
        let diagram_event_id = match self.delivery.send_image(room_id, &diagram, None).await {
            Ok(event_id) => event_id,
            Err(error) => {
                error!(room_id = %room_id, %error, "failed to send new game diagram");
                return HandleOutcome::Ignored(NoOpReason::DeliveryFailed);
            }
        };

        let session = GameSession::new(room_id.clone(), game.to_pgn(), Some(diagram_event_id));
        if let Err(error) = self.sessions.put(&session).await {
            error!(room_id = %room_id, %error, "failed to save new game");
            return HandleOutcome::Ignored(NoOpReason::StorageFailed);
        }

        info!(room_id = %room_id, "started new game");
        HandleOutcome::Replied(ReplyKind::NewGame)
    }

    async fn send_help(&self, room_id: &RoomId) -> HandleOutcome {
        match self.delivery.send(room_id, &help_content(&self.version, self.source_url.as_deref())).await {
            Ok(_) => HandleOutcome::Replied(ReplyKind::Help),
            Err(error) => {
                error!(room_id = %room_id, %error, "failed to send help");
                HandleOutcome::Ignored(NoOpReason::DeliveryFailed)
            }
        }
    }

    /// Reply to a message carrying a FEN with a diagram threaded under
    /// `source_event_id`, and index the reply for later edits.
    async fn show_position(
        &self,
        room_id: &RoomId,
        source_event_id: &EventId,
        fen: &str,
    ) -> HandleOutcome {
        let game = match ChessGame::from_fen(fen) {
            Ok(game) => game,
            Err(error) => {
                warn!(room_id = %room_id, fen, %error, "unable to parse FEN");
                return HandleOutcome::Ignored(NoOpReason::PositionParseError);
            }
        };

        let diagram = match self.render(game.position().board(), &[]) {
            Ok(diagram) => diagram,
            Err(reason) => return HandleOutcome::Ignored(reason),
        };
        let diagram_event_id = match self
            .delivery
            .send_image(room_id, &diagram, Some(source_event_id))
            .await
        {
            Ok(event_id) => event_id,
            Err(error) => {
                error!(room_id = %room_id, %error, "failed to send position diagram");
                return HandleOutcome::Ignored(NoOpReason::DeliveryFailed);
            }
        };

        if let Err(error) = self
            .sessions
            .set_diagram_for_source(room_id, source_event_id, &diagram_event_id)
            .await
        {
            error!(room_id = %room_id, %error, "failed to index position diagram");
            return HandleOutcome::Ignored(NoOpReason::StorageFailed);
        }

        HandleOutcome::Replied(ReplyKind::PositionDiagram)
    }

    async fn play_move(&self, session: GameSession, text: &str) -> HandleOutcome {
        let room_id = &session.room_id;
        let mut game = match ChessGame::from_pgn(&session.pgn) {
            Ok(game) => game,
            Err(error) => {
                warn!(room_id = %room_id, %error, "stored game is unreadable");
                return HandleOutcome::Ignored(NoOpReason::NoActiveGame);
            }
        };

        let played = match game.play(text) {
            Ok(played) => played,
            Err(error) => {
                debug!(room_id = %room_id, %error, "not a move");
                return HandleOutcome::Ignored(NoOpReason::IllegalMove);
            }
        };

        let diagram = match self.render(game.position().board(), &[played.from, played.to]) {
            Ok(diagram) => diagram,
            Err(reason) => return HandleOutcome::Ignored(reason),
        };

        if let Some(previous) = &session.last_diagram_event_id {
            self.delivery.redact(room_id, previous).await;
        }

        let diagram_event_id = match self.delivery.send_image(room_id, &diagram, None).await {
            Ok(event_id) => event_id,
            Err(error) => {
                error!(room_id = %room_id, san = %played.san, %error, "failed to send move diagram");
                return HandleOutcome::Ignored(NoOpReason::DeliveryFailed);
            }
        };

        let updated = GameSession::new(room_id.clone(), game.to_pgn(), Some(diagram_event_id));
        if let Err(error) = self.sessions.put(&updated).await {
            error!(room_id = %room_id, %error, "failed to save move");
            return HandleOutcome::Ignored(NoOpReason::StorageFailed);
        }

        info!(room_id = %room_id, san = %played.san, "played move");
        HandleOutcome::Replied(ReplyKind::MoveDiagram)
    }

    fn render(&self, board: &Board, highlight: &[Square]) -> Result<RenderedDiagram, NoOpReason> {
        self.renderer.render(board, highlight).map_err(|error| {
            error!(%error, "failed to render board");
            NoOpReason::RenderFailed
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chessbot_types::event::InboundMessage;

    use super::*;
    use crate::chess::{RenderError, PngBoardRenderer};
    use crate::test_support::{
        FakeCrypto, FakeTransport, MemoryRoomState, MemorySessionStore, bot_user, fast_retry, room,
        user,
    };

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    const SICILIAN_FEN: &str = "rnbqkbnr/pp1ppppp/8/2p5/4P3/8/PPPP1PPP/RNBQKBNR w KQkq c6 0 2";

    /// Records the highlighted squares of every render.
    #[derive(Default)]
    struct RecordingRenderer {
        highlights: Mutex<Vec<Vec<Square>>>,
    }

    impl BoardRenderer for RecordingRenderer {
        fn render(&self, board: &Board, highlight: &[Square]) -> Result<RenderedDiagram, RenderError> {
            self.highlights.lock().unwrap().push(highlight.to_vec());
            PngBoardRenderer::default().render(board, highlight)
        }
    }

    struct Harness {
        transport: Arc<FakeTransport>,
        sessions: Arc<MemorySessionStore>,
        renderer: Arc<RecordingRenderer>,
        controller: GameController<MemorySessionStore, FakeTransport, FakeCrypto, MemoryRoomState>,
    }

    fn harness() -> Harness {
        let transport = Arc::new(FakeTransport::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let renderer = Arc::new(RecordingRenderer::default());
        let delivery = Arc::new(DeliveryPipeline::new(
            Arc::clone(&transport),
            Arc::new(FakeCrypto::new()),
            Arc::new(MemoryRoomState::new()),
            fast_retry(),
        ));
        let controller = GameController::new(
            bot_user(),
            Arc::clone(&sessions),
            delivery,
            Arc::clone(&renderer) as Arc<dyn BoardRenderer>,
            "0.1.0",
        )
        .with_source_url(Some("https://git.example.org/chessbot".to_string()));
        Harness {
            transport,
            sessions,
            renderer,
            controller,
        }
    }

    fn message(event_id: &str, body: &str) -> InboundMessage {
        InboundMessage {
            room_id: room(),
            sender: user("@alice:example.org"),
            event_id: EventId::new(event_id),
            body: body.to_string(),
            replaces: None,
        }
    }

    fn edit(event_id: &str, original: &str, body: &str) -> InboundMessage {
        InboundMessage {
            replaces: Some(EventId::new(original)),
            ..message(event_id, body)
        }
    }

    fn moves_of(session: &GameSession) -> Vec<String> {
        ChessGame::from_pgn(&session.pgn).unwrap().moves().to_vec()
    }

    impl Harness {
        async fn send(&self, event_id: &str, body: &str) -> HandleOutcome {
            self.controller.handle(&message(event_id, body)).await
        }
    }

    // -------------------------------------------------------------------
    // new / help
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn test_new_game_sends_diagram_and_persists() {
        let h = harness();
        let outcome = h.send("$1", "!chess new").await;
        assert_eq!(outcome, HandleOutcome::Replied(ReplyKind::NewGame));

        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content["msgtype"], "m.image");
        assert!(sent[0].content.get("m.relates_to").is_none());

        let session = h.sessions.session(&room()).unwrap();
        assert!(session.is_active());
        assert!(session.pgn.contains("[Event \"!chess:example.org @ "));
        assert!(moves_of(&session).is_empty());
        assert_eq!(session.last_diagram_event_id, Some(sent[0].event_id.clone()));
        assert_eq!(h.renderer.highlights.lock().unwrap().as_slice(), &[Vec::<Square>::new()]);
    }

    #[tokio::test]
    async fn test_new_twice_discards_prior_game() {
        let h = harness();
        h.send("$1", "!chess new").await;
        h.send("$2", "e4").await;
        assert_eq!(moves_of(&h.sessions.session(&room()).unwrap()), ["e4"]);

        let before = h.transport.sent().len();
        let outcome = h.send("$3", "chessbot: new").await;
        assert_eq!(outcome, HandleOutcome::Replied(ReplyKind::NewGame));
        assert_eq!(h.transport.sent().len(), before + 1);
        assert!(moves_of(&h.sessions.session(&room()).unwrap()).is_empty());
    }

    #[tokio::test]
    async fn test_help_and_unknown_command_send_notice() {
        let h = harness();
        assert_eq!(h.send("$1", "!chessbot").await, HandleOutcome::Replied(ReplyKind::Help));
        assert_eq!(h.send("$2", "!chess resign").await, HandleOutcome::Replied(ReplyKind::Help));

        let sent = h.transport.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|e| e.content["msgtype"] == "m.notice"));
        assert!(sent[0].content["body"].as_str().unwrap().contains("Version 0.1.0."));
        assert!(
            sent[0].content["body"]
                .as_str()
                .unwrap()
                .ends_with("Source code: https://git.example.org/chessbot")
        );
        assert!(h.sessions.session(&room()).is_none());
    }

    // -------------------------------------------------------------------
    // Moves
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn test_move_redacts_previous_and_highlights_squares() {
        let h = harness();
        h.send("$1", "!chess new").await;
        let first_diagram = h.transport.sent()[0].event_id.clone();

        let outcome = h.send("$2", "e4").await;
        assert_eq!(outcome, HandleOutcome::Replied(ReplyKind::MoveDiagram));
        assert_eq!(h.transport.redacted(), vec![first_diagram]);
        assert_eq!(
            h.renderer.highlights.lock().unwrap().last().unwrap(),
            &vec![Square::E2, Square::E4]
        );
    }

    #[tokio::test]
    async fn test_single_live_diagram_after_many_moves() {
        let h = harness();
        h.send("$0", "!chess new").await;
        for (i, mv) in ["e4", "e5", "Nf3", "Nc6", "Bb5"].iter().enumerate() {
            let outcome = h.send(&format!("${}", i + 1), mv).await;
            assert_eq!(outcome, HandleOutcome::Replied(ReplyKind::MoveDiagram));
        }

        let live = h.transport.live_events();
        assert_eq!(live.len(), 1);
        assert_eq!(h.transport.redacted().len(), 5);

        let session = h.sessions.session(&room()).unwrap();
        assert_eq!(session.last_diagram_event_id, Some(live[0].event_id.clone()));
        assert_eq!(moves_of(&session), ["e4", "e5", "Nf3", "Nc6", "Bb5"]);
    }

    #[tokio::test]
    async fn test_illegal_move_is_silent_noop() {
        let h = harness();
        h.send("$1", "!chess new").await;
        let before = h.sessions.session(&room()).unwrap();

        let outcome = h.send("$2", "e9e9").await;
        assert_eq!(outcome, HandleOutcome::Ignored(NoOpReason::IllegalMove));
        assert_eq!(h.sessions.session(&room()).unwrap().pgn, before.pgn);
        assert_eq!(h.transport.sent().len(), 1);
        assert!(h.transport.redacted().is_empty());
        assert!(h.transport.read_receipts().contains(&EventId::new("$2")));
    }

    #[tokio::test]
    async fn test_move_without_game_is_not_applicable() {
        let h = harness();
        let outcome = h.send("$1", "e4").await;
        assert_eq!(outcome, HandleOutcome::Ignored(NoOpReason::NotApplicable));
        assert!(h.transport.sent().is_empty());
        assert_eq!(h.transport.read_receipts(), vec![EventId::new("$1")]);
    }

    #[tokio::test]
    async fn test_unreadable_stored_game_is_noop() {
        let h = harness();
        h.sessions
            .put(&GameSession::new(room(), "1. e4 e4 *".into(), None))
            .await
            .unwrap();
        let outcome = h.send("$1", "d4").await;
        assert_eq!(outcome, HandleOutcome::Ignored(NoOpReason::NoActiveGame));
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_move_survives_four_send_failures() {
        let h = harness();
        h.send("$1", "!chess new").await;
        h.transport.fail_sends(4);

        let outcome = h.send("$2", "d4").await;
        assert_eq!(outcome, HandleOutcome::Replied(ReplyKind::MoveDiagram));
        assert_eq!(moves_of(&h.sessions.session(&room()).unwrap()), ["d4"]);
    }

    #[tokio::test]
    async fn test_exhausted_send_leaves_session_unmutated() {
        let h = harness();
        h.send("$1", "!chess new").await;
        let before = h.sessions.session(&room()).unwrap();
        h.transport.fail_sends(5);

        let outcome = h.send("$2", "d4").await;
        assert_eq!(outcome, HandleOutcome::Ignored(NoOpReason::DeliveryFailed));
        assert_eq!(h.sessions.session(&room()).unwrap(), before);
        assert_eq!(h.transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported() {
        let h = harness();
        h.sessions.fail_writes(true);
        let outcome = h.send("$1", "!chess new").await;
        assert_eq!(outcome, HandleOutcome::Ignored(NoOpReason::StorageFailed));
        assert!(h.sessions.session(&room()).is_none());
    }

    // -------------------------------------------------------------------
    // Position import and edits
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn test_position_import_threads_and_indexes() {
        let h = harness();
        let body = format!("what do you think of {SICILIAN_FEN}?");
        let outcome = h.send("$q", &body).await;
        assert_eq!(outcome, HandleOutcome::Replied(ReplyKind::PositionDiagram));

        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content["m.relates_to"]["rel_type"], "m.thread");
        assert_eq!(sent[0].content["m.relates_to"]["event_id"], "$q");
        assert_eq!(h.sessions.diagram(&room(), &EventId::new("$q")), Some(sent[0].event_id.clone()));
        assert!(h.sessions.session(&room()).is_none());
    }

    #[tokio::test]
    async fn test_edited_position_replaces_diagram() {
        let h = harness();
        h.send("$q", START_FEN).await;
        let first = h.transport.sent()[0].event_id.clone();

        let outcome = h
            .controller
            .handle(&edit("$q2", "$q", &format!("* {SICILIAN_FEN}")))
            .await;
        assert_eq!(outcome, HandleOutcome::Replied(ReplyKind::PositionDiagram));

        assert_eq!(h.transport.redacted(), vec![first]);
        let live = h.transport.live_events();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].content["m.relates_to"]["event_id"], "$q");
        assert_eq!(h.sessions.diagram(&room(), &EventId::new("$q")), Some(live[0].event_id.clone()));
        assert_eq!(h.sessions.diagram(&room(), &EventId::new("$q2")), None);
    }

    #[tokio::test]
    async fn test_edit_removing_position_redacts_diagram() {
        let h = harness();
        h.send("$q", START_FEN).await;
        let outcome = h.controller.handle(&edit("$q2", "$q", "never mind")).await;
        assert_eq!(outcome, HandleOutcome::Ignored(NoOpReason::NotApplicable));
        assert!(h.transport.live_events().is_empty());
    }

    #[tokio::test]
    async fn test_edits_are_not_commands() {
        let h = harness();
        let outcome = h.controller.handle(&edit("$2", "$1", "!chess new")).await;
        assert_eq!(outcome, HandleOutcome::Ignored(NoOpReason::NotApplicable));
        assert!(h.sessions.session(&room()).is_none());
    }

    #[tokio::test]
    async fn test_unplayable_position_is_silent() {
        let h = harness();
        let outcome = h.send("$1", "8/8/8/8/8/8/8/8 w - - 0 1").await;
        assert_eq!(outcome, HandleOutcome::Ignored(NoOpReason::PositionParseError));
        assert!(h.transport.sent().is_empty());
    }

    // -------------------------------------------------------------------
    // Own messages
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn test_own_message_is_marked_read_only() {
        let h = harness();
        let own = InboundMessage {
            sender: bot_user(),
            ..message("$self", "!chess new")
        };
        let outcome = h.controller.handle(&own).await;
        assert_eq!(outcome, HandleOutcome::Ignored(NoOpReason::OwnMessage));
        assert!(h.transport.sent().is_empty());
        assert_eq!(h.transport.read_receipts(), vec![EventId::new("$self")]);
    }
}
