mod support;

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use tapedeck_core::app::{App, Command, Flow};
use tapedeck_core::console;
use tapedeck_core::navigation::Screen;
use tapedeck_core::project::Selection;
use tapedeck_core::render::Renderer;
use tapedeck_core::tape::Slot;
use tapedeck_core::view::{SortKey, ViewMode, ViewState};
use tapedeck_shared::MoveAction;

use support::{FakeBackend, Reply, tape, tape_at};

fn session(backend: &Arc<FakeBackend>) -> App<Vec<u8>> {
    App::new(
        Vec::new(),
        Renderer::plain(),
        backend.clone(),
        Duration::ZERO,
        ViewState::default(),
    )
}

fn take_output(app: &mut App<Vec<u8>>) -> String {
    let bytes = std::mem::take(app.output_mut());
    String::from_utf8(bytes).expect("utf8 output")
}

async fn run(app: &mut App<Vec<u8>>, command: Command) -> String {
    let flow = app
        .dispatch(command, &mut |_: &str| true)
        .await
        .expect("dispatch");
    assert_eq!(flow, Flow::Continue);
    take_output(app)
}

#[tokio::test]
async fn entering_directory_loads_and_renders_list() {
    let backend = Arc::new(FakeBackend::new(vec![
        tape(1, "Harvest", false),
        tape(2, "Blue", true),
    ]));
    let mut app = session(&backend);
    assert_eq!(backend.fetch_count(), 0);

    let text = run(&mut app, Command::Navigate(Screen::Directory)).await;
    assert_eq!(app.screen(), Screen::Directory);
    assert_eq!(backend.fetch_count(), 1);
    assert!(text.contains("[OUT] Harvest"));
    assert!(text.contains("Blue"));

    run(&mut app, Command::Navigate(Screen::Main)).await;
    assert_eq!(backend.fetch_count(), 1);
    run(&mut app, Command::Navigate(Screen::Directory)).await;
    assert_eq!(backend.fetch_count(), 2);
}

#[tokio::test]
async fn failed_directory_load_draws_nothing() {
    let backend = Arc::new(FakeBackend::new(vec![tape(1, "Harvest", true)]));
    backend.with(|s| s.fetch_fails = true);
    let mut app = session(&backend);

    let text = run(&mut app, Command::Navigate(Screen::Directory)).await;
    assert_eq!(text, "");
    assert_eq!(app.screen(), Screen::Directory);
    assert!(!app.store().snapshot().is_loaded());

    backend.with(|s| s.fetch_fails = false);
    run(&mut app, Command::Navigate(Screen::Main)).await;
    run(&mut app, Command::Navigate(Screen::Directory)).await;
    let generation = app.store().snapshot().generation();

    backend.with(|s| s.fetch_fails = true);
    run(&mut app, Command::Navigate(Screen::Main)).await;
    let text = run(&mut app, Command::Navigate(Screen::Directory)).await;
    assert_eq!(text, "");
    assert_eq!(app.store().snapshot().generation(), generation);
    assert_eq!(backend.fetch_count(), 3);
}

#[tokio::test]
async fn view_changes_never_fetch() {
    let backend = Arc::new(FakeBackend::new(vec![
        tape_at(1, "Harvest", true, 1, 11),
        tape(2, "Blue", true),
    ]));
    let mut app = session(&backend);
    run(&mut app, Command::Navigate(Screen::Directory)).await;

    let text = run(&mut app, Command::Search("blue".to_string())).await;
    assert!(text.contains("Blue"));
    assert!(!text.contains("Harvest"));

    run(&mut app, Command::Sort(SortKey::NameAsc)).await;
    let text = run(&mut app, Command::ToggleMode).await;
    assert_eq!(app.view().mode(), ViewMode::Grid);
    assert_eq!(app.view().search_term(), "");
    assert!(text.contains("y=11"));
    assert!(text.contains("[Harvest]"));

    let text = run(&mut app, Command::Sort(SortKey::PlaysDesc)).await;
    assert!(text.contains("only available in the list view"));
    assert_eq!(app.view().sort_key(), SortKey::NameAsc);

    assert_eq!(backend.fetch_count(), 1);
}

#[tokio::test]
async fn genre_filter_and_search_replace_each_other() {
    let backend = Arc::new(FakeBackend::new(vec![tape(1, "Harvest", true)]));
    let mut app = session(&backend);

    run(&mut app, Command::Search("harv".to_string())).await;
    run(
        &mut app,
        Command::ApplyGenres(vec!["rock".to_string(), " ".to_string()]),
    )
    .await;
    assert_eq!(app.view().search_term(), "");
    assert_eq!(app.view().genre_filter().len(), 1);

    run(&mut app, Command::Search("blue".to_string())).await;
    assert!(app.view().genre_filter().is_empty());

    let text = run(&mut app, Command::ListGenres).await;
    assert!(text.contains("[ ] jazz"));
    assert!(text.contains("[ ] rock"));

    backend.with(|s| s.tags = None);
    let text = run(&mut app, Command::ListGenres).await;
    assert!(text.contains("Could not load genres."));
}

#[tokio::test]
async fn grid_cells_open_detail_or_prefilled_form() {
    let backend = Arc::new(FakeBackend::new(vec![tape_at(7, "Harvest", false, 3, 4)]));
    let mut app = session(&backend);
    run(&mut app, Command::Refresh).await;

    let text = run(&mut app, Command::Cell(Slot::new(3, 4).expect("slot"))).await;
    assert_eq!(app.open_tape(), Some(7));
    assert!(text.contains("action    RETURN"));

    let empty = Slot::new(5, 1).expect("slot");
    run(&mut app, Command::Cell(empty)).await;
    assert!(app.add_form().open);
    assert_eq!(app.add_form().slot, Some(empty));

    run(&mut app, Command::CloseAdd).await;
    assert_eq!(app.add_form().slot, None);

    run(&mut app, Command::Select(Selection::AddAt(empty))).await;
    assert_eq!(app.add_form().slot, Some(empty));
}

#[tokio::test]
async fn only_the_offered_action_reaches_the_machine() {
    let backend = Arc::new(FakeBackend::new(vec![
        tape(1, "Harvest", false),
        tape(2, "Blue", true),
    ]));
    let mut app = session(&backend);
    run(&mut app, Command::Refresh).await;

    let text = run(&mut app, Command::Dispense(1)).await;
    assert!(text.contains("offered action is RETURN"));
    let text = run(&mut app, Command::Dispense(99)).await;
    assert!(text.contains("unknown tape 99"));
    assert!(backend.calls().is_empty());

    let text = run(&mut app, Command::Dispense(2)).await;
    assert!(text.contains("DISPENSING..."));
    assert!(text.contains("Dispensing"));
    assert_eq!(backend.calls(), vec!["dispense 2".to_string()]);
    assert!(app.store().snapshot().find(2).is_some_and(|t| !t.in_machine));
}

#[tokio::test]
async fn add_through_session_reports_validation() {
    let backend = Arc::new(FakeBackend::new(vec![]));
    let mut app = session(&backend);

    let text = run(
        &mut app,
        Command::SubmitAdd {
            name: String::new(),
            artist: "Nobody".to_string(),
            slot: None,
        },
    )
    .await;
    assert!(text.contains("Name required"));
    assert!(backend.calls().is_empty());

    let text = run(
        &mut app,
        Command::SubmitAdd {
            name: "Blue".to_string(),
            artist: "Joni Mitchell".to_string(),
            slot: Slot::new(1, 1),
        },
    )
    .await;
    assert!(text.contains("cassette added"));
    assert!(!app.add_form().open);
    assert_eq!(app.store().snapshot().tapes().len(), 1);
}

#[tokio::test]
async fn removal_panel_filters_and_declines() {
    let backend = Arc::new(FakeBackend::new(vec![
        tape(1, "Harvest", true),
        tape(2, "Blue", true),
    ]));
    let mut app = session(&backend);

    let text = run(&mut app, Command::OpenRemoval).await;
    assert!(text.contains("Harvest - Artist"));
    let text = run(&mut app, Command::FilterRemoval("BLU".to_string())).await;
    assert!(text.contains("Blue - Artist"));
    assert!(!text.contains("Harvest"));

    app.dispatch(Command::Remove(2), &mut |_: &str| false)
        .await
        .expect("dispatch");
    assert!(take_output(&mut app).contains("cancelled"));
    assert!(backend.calls().is_empty());

    run(&mut app, Command::Remove(2)).await;
    assert_eq!(backend.calls(), vec!["remove 2".to_string()]);
    assert_eq!(app.store().snapshot().tapes().len(), 1);
}

#[tokio::test]
async fn hardware_commands_show_status_or_comm_error() {
    let backend = Arc::new(FakeBackend::new(vec![]));
    backend.with(|s| s.machine = Reply::Ok(Some("Moved to 2,3")));
    let mut app = session(&backend);
    run(&mut app, Command::Navigate(Screen::DevMode)).await;

    let text = run(
        &mut app,
        Command::Move {
            action: MoveAction::Goto,
            x: 2,
            y: 3,
        },
    )
    .await;
    assert_eq!(text.trim(), "Moved to 2,3");

    run(
        &mut app,
        Command::Move {
            action: MoveAction::Home,
            x: 4,
            y: 9,
        },
    )
    .await;

    backend.with(|s| s.machine = Reply::Network);
    let text = run(&mut app, Command::Offset(1.5)).await;
    assert_eq!(text.trim(), "Comm Error");
    assert_eq!(
        backend.calls(),
        vec![
            "move goto 2 3".to_string(),
            "move home 0 0".to_string(),
            "offset 1.5".to_string(),
        ]
    );
    assert_eq!(backend.fetch_count(), 0);
}

#[tokio::test]
async fn quit_ends_the_session() {
    let backend = Arc::new(FakeBackend::new(vec![]));
    let mut app = session(&backend);
    let flow = app
        .dispatch(Command::Quit, &mut |_: &str| true)
        .await
        .expect("dispatch");
    assert_eq!(flow, Flow::Quit);
}

#[tokio::test]
async fn console_prompt_names_the_current_screen() {
    let backend = Arc::new(FakeBackend::new(vec![]));
    let mut app = session(&backend);

    let input = Cursor::new("dev\nbogus\nquit\nstatus\n");
    console::run(&mut app, input, true)
        .await
        .expect("console");

    let text = take_output(&mut app);
    assert!(text.starts_with("tapedeck:main> "));
    assert!(text.contains("tapedeck:dev> error: unknown or ambiguous command: bogus"));
    assert!(!text.contains("screen    dev"));
    assert_eq!(app.screen(), Screen::DevMode);
}
