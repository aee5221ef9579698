use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, Table};
use wordrush_core::evaluator::Evaluation;
use wordrush_core::sync::{GameView, Row, TileState};
use wordrush_core::Word;

fn tile_cell(letter: Option<char>, state: TileState) -> Cell {
    let text = letter.map(|c| c.to_string()).unwrap_or_else(|| {
        if state == TileState::Empty {
            " ".to_string()
        } else {
            "?".to_string()
        }
    });

    let cell = Cell::new(text).add_attribute(Attribute::Bold);
    match state {
        TileState::Correct => cell.fg(Color::Green),
        TileState::Present => cell.fg(Color::Yellow),
        TileState::Absent => cell.fg(Color::DarkGrey),
        TileState::Filled => cell.fg(Color::White),
        TileState::Empty => cell,
    }
}

fn row_cells(row: &Row) -> Vec<Cell> {
    row.iter().map(|t| tile_cell(t.letter, t.state)).collect()
}

pub fn evaluation_table(guess: &Word, evaluation: &Evaluation) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.add_row(
        guess
            .letters()
            .zip(evaluation)
            .map(|(letter, result)| tile_cell(Some(letter), (*result).into()))
            .collect::<Vec<_>>(),
    );
    table.add_row(
        evaluation
            .iter()
            .map(|r| Cell::new(r.code()))
            .collect::<Vec<_>>(),
    );
    table
}

pub fn print_view(view: &GameView) {
    println!();
    let Some(session) = &view.session else {
        println!("Status: {}", view.phase);
        if let Some(error) = &view.error {
            println!("  {}", error);
        }
        return;
    };

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    for row in &session.grid {
        table.add_row(row_cells(row));
    }
    println!("{}", table);

    println!(
        "Game #{}  |  {}  |  attempts {}/{}",
        session.game_id, view.phase, session.attempts_used, session.max_attempts
    );

    let pending = session.pending_rows();
    if pending > 0 {
        println!("  {} guess(es) awaiting confirmation", pending);
    }
    if let Some(answer) = &session.answer {
        println!("  Answer: {}", answer);
    }
    if let Some(bounty) = &session.bounty {
        let state = if bounty.active { "active" } else { "closed" };
        println!("  Bounty: {:.6} ({})", bounty.remaining_amount, state);
    }
    if let Some(synced) = view.last_synced {
        println!("  Last synced: {}", synced.format("%H:%M:%S UTC"));
    }
    if let Some(error) = &view.error {
        println!("  ⚠️  {}", error);
    }
}
