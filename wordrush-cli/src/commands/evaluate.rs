use super::display::evaluation_table;
use wordrush_core::evaluator::is_solved;
use wordrush_core::{evaluate, Result, Word};

pub fn handle_evaluate_command(guess: &str, answer: &str) -> Result<()> {
    let guess = Word::parse(guess)?;
    let answer = Word::parse(answer)?;
    let evaluation = evaluate(&guess, &answer);

    println!("{}", evaluation_table(&guess, &evaluation));
    if is_solved(&evaluation) {
        println!("🎉 Solved");
    }
    Ok(())
}
