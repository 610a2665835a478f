use clap::{Parser, ValueEnum};
use log::{info, warn};
use rand::Rng;
use shared::codec::{decode_server, encode};
use shared::{
    ClientAnswer, ClientMessage, JoinRequest, JoiningResult, ServerMessage,
    CANDIDATE_COUNT, DEFAULT_PORT, NO_ANSWER_INDEX, PLAYER_PASSES, SUB_QUESTION_COUNT,
};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Online,
    Join,
    Create,
}

/// Scripted player for smoke testing a running server
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// How to enter a game
    #[clap(short, long, value_enum, default_value = "online")]
    mode: Mode,
    /// Player name
    #[clap(short, long, default_value = "bot")]
    name: String,
    /// Friend game code, for `--mode join`
    #[clap(short, long)]
    code: Option<String>,
    /// Friend game size, for `--mode create`
    #[clap(long, default_value_t = 2)]
    players: u8,
    /// Probability of passing instead of answering
    #[clap(long, default_value_t = 0.1)]
    pass_probability: f64,
    /// Delay before each answer in milliseconds
    #[clap(long, default_value_t = 500)]
    think_ms: u64,
}

/// Sub-questions answered so far in the current round
struct Board {
    answered: [bool; SUB_QUESTION_COUNT],
}

impl Board {
    fn new() -> Self {
        Self {
            answered: [false; SUB_QUESTION_COUNT],
        }
    }

    fn reset(&mut self) {
        self.answered = [false; SUB_QUESTION_COUNT];
    }

    fn mark(&mut self, answer_id: i32) {
        if let Some(flag) = usize::try_from(answer_id)
            .ok()
            .and_then(|index| self.answered.get_mut(index))
        {
            *flag = true;
        }
    }

    fn choose(&self, pass_probability: f64) -> ClientAnswer {
        let mut rng = rand::thread_rng();
        let open = self.answered.iter().position(|answered| !answered);

        match open {
            Some(index) if !rng.gen_bool(pass_probability.clamp(0.0, 1.0)) => {
                let pick = rng.gen_range(0..CANDIDATE_COUNT) as i32;
                ClientAnswer::new(index as i32, pick)
            }
            _ => ClientAnswer::new(PLAYER_PASSES, NO_ANSWER_INDEX),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let address = format!("{}:{}", args.host, args.port);
    let stream = TcpStream::connect(&address).await?;
    info!("Connected to {}", address);

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let request = match args.mode {
        Mode::Online => JoinRequest::online(&args.name),
        Mode::Join => JoinRequest::join_friend(&args.name, args.code.clone().unwrap_or_default()),
        Mode::Create => JoinRequest::create_friend(&args.name, args.players),
    };
    let line = encode(&ClientMessage::Join(request))?;
    writer.write_all(format!("{}\n", line).as_bytes()).await?;

    let mut board = Board::new();

    while let Some(line) = lines.next_line().await? {
        let message = match decode_server(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Unreadable message from server: {}", e);
                continue;
            }
        };

        let my_turn = match message {
            ServerMessage::Joining(joining) => {
                info!(
                    "Joining: {:?}, code {:?}, {} players",
                    joining.joining_result, joining.game_code, joining.player_count
                );
                if joining.joining_result != JoiningResult::Joined {
                    break;
                }
                false
            }
            ServerMessage::Waiting(waiting) => {
                let names: Vec<_> = waiting
                    .waiting_players
                    .iter()
                    .map(|player| player.player_name.as_str())
                    .collect();
                info!("Waiting ({}): {:?}", waiting.start_ready, names);
                false
            }
            ServerMessage::Start(start) => {
                info!("Round {}: {}", start.round_number, start.question.text);
                board.reset();
                start.turn.my_turn
            }
            ServerMessage::Answer(answer) => {
                info!(
                    "{} answered {} with {} (correct {}), next {:?}",
                    answer.player_name,
                    answer.answer_id,
                    answer.player_answer_index,
                    answer.correct_answer_index,
                    answer.turn.player_on_move
                );
                board.mark(answer.answer_id);
                answer.turn.my_turn
            }
            ServerMessage::Evaluation(evaluation) => {
                for score in &evaluation.player_scores {
                    info!("  {}: {}", score.name, score.score);
                }
                if evaluation.game_over {
                    info!("Game over");
                    break;
                }
                false
            }
        };

        if my_turn {
            sleep(Duration::from_millis(args.think_ms)).await;
            let answer = board.choose(args.pass_probability);
            info!("Answering {:?}", answer);
            let line = encode(&ClientMessage::Answer(answer))?;
            writer.write_all(format!("{}\n", line).as_bytes()).await?;
        }
    }

    info!("Test client finished");
    Ok(())
}
