//! CLI 모듈
//!
//! tijuca-guia CLI 명령어 정의 및 구현

use std::io::Write as IoWrite;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::embedding::HttpEmbedding;
use crate::ingest;
use crate::knowledge::PassageRetriever;
use crate::llm::GroqChat;
use crate::maps::{reconstruct_image, upscale_for_display, MapCandidate, MapIndex};
use crate::pipeline::Guide;
use crate::weather::{WeatherApi, WeatherProvider};

/// 대화 세션 ID (CLI는 단일 세션)
const CLI_SESSION_ID: &str = "cli";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "tijuca-guia")]
#[command(version, about = "Guia virtual do Parque Nacional da Tijuca", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 대화형 가이드 시작
    Chat,

    /// 문서/지도 수집
    Ingest {
        #[command(subcommand)]
        target: IngestTarget,
    },

    /// 지식베이스 검색 (디버그용)
    Query {
        /// 검색 질의
        query: String,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// 상태 확인
    Status,
}

#[derive(Subcommand)]
pub enum IngestTarget {
    /// PDF 문서 수집 (재귀)
    Docs {
        /// 문서 폴더 경로
        dir: PathBuf,
    },

    /// 지도 이미지 수집 (기존 인덱스 교체)
    Maps {
        /// 지도 폴더 경로
        dir: PathBuf,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Chat => cmd_chat().await,
        Commands::Ingest { target } => match target {
            IngestTarget::Docs { dir } => cmd_ingest_docs(&dir).await,
            IngestTarget::Maps { dir } => cmd_ingest_maps(&dir).await,
        },
        Commands::Query { query, limit } => cmd_query(&query, limit).await,
        Commands::Status => cmd_status().await,
    }
}

// ============================================================================
// Service construction
// ============================================================================

async fn build_retriever(config: &AppConfig) -> Result<PassageRetriever> {
    let embedder = Arc::new(
        HttpEmbedding::new(
            config.embeddings_base_url.clone(),
            config.embeddings_model.clone(),
        )
        .context("Falha ao criar cliente de embeddings")?,
    );
    PassageRetriever::with_data_dir(&config.data_dir, embedder)
        .await
        .context("Falha ao abrir a base de conhecimento")
}

fn open_map_index(config: &AppConfig) -> Result<MapIndex> {
    MapIndex::open(&config.data_dir.join("maps.db")).context("Falha ao abrir o índice de mapas")
}

async fn build_guide(config: &AppConfig) -> Result<Guide> {
    let Some(api_key) = config.groq_api_key.clone() else {
        bail!(
            "Chave de API não configurada.\n\n\
             Configure:\n  export GROQ_API_KEY=sua-chave\n\n\
             Obtenha uma chave em: https://console.groq.com"
        );
    };

    let llm = Arc::new(GroqChat::new(api_key).context("Falha ao criar cliente Groq")?);
    let retriever = Arc::new(build_retriever(config).await?);
    let maps = Arc::new(open_map_index(config)?);

    let weather: Option<Arc<dyn WeatherProvider>> = config
        .weather_api_key
        .as_ref()
        .map(|key| Arc::new(WeatherApi::new(key.clone())) as Arc<dyn WeatherProvider>);

    Ok(Guide::new(
        llm,
        retriever,
        maps,
        weather,
        config.capabilities(),
    ))
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 대화형 가이드 (chat)
async fn cmd_chat() -> Result<()> {
    let config = AppConfig::from_env();
    let guide = build_guide(&config).await?;
    let map_index = open_map_index(&config)?;

    println!("=====================================================");
    println!("  Guia Virtual - Parque Nacional da Tijuca");
    println!("=====================================================");
    println!("Pergunte sobre trilhas, clima, história, fauna e flora.");
    println!("Comandos: 'sair' para encerrar, 'limpar' para nova conversa, 'ajuda' para ajuda.");
    println!();

    let stdin = std::io::stdin();
    loop {
        print!("Você: ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break; // EOF
        }
        let input = line.trim();

        if input.is_empty() {
            continue;
        }

        match input.to_lowercase().as_str() {
            "sair" => {
                println!("Até logo! Boa visita ao parque.");
                break;
            }
            "limpar" => {
                guide.reset_session(CLI_SESSION_ID).await;
                println!("[OK] Conversa reiniciada.");
                continue;
            }
            "ajuda" => {
                print_help();
                continue;
            }
            _ => {}
        }

        let reply = guide.process_query(CLI_SESSION_ID, input).await;

        println!();
        println!("Guia: {}", reply.answer);

        if !reply.citations.is_empty() {
            println!();
            println!("Fontes:");
            for citation in &reply.citations {
                println!("  - {} (Parte {})", citation.source_file, citation.part_index);
            }
        }

        if !reply.map_candidates.is_empty() {
            offer_maps(&map_index, &reply.map_candidates, &stdin)?;
        }

        println!();
    }

    Ok(())
}

fn print_help() {
    println!("Exemplos de perguntas:");
    println!("  - Como chegar ao Pico da Tijuca?");
    println!("  - Vai chover amanhã?");
    println!("  - Qual a história do parque?");
    println!();
    println!("Comandos: sair, limpar, ajuda");
}

/// 트레일 답변 후 지도 저장 제안
fn offer_maps(
    index: &MapIndex,
    candidates: &[MapCandidate],
    stdin: &std::io::Stdin,
) -> Result<()> {
    println!();
    println!("Mapas relacionados:");
    for (i, c) in candidates.iter().enumerate() {
        println!(
            "  {}. {} (Página {}) - relevância {}",
            i + 1,
            c.display_name,
            c.page_number,
            c.relevance_score
        );
    }
    print!("Deseja salvar algum mapa? Digite o número (ou Enter para continuar): ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    stdin.read_line(&mut line)?;
    let choice = line.trim();
    if choice.is_empty() {
        return Ok(());
    }

    let Ok(n) = choice.parse::<usize>() else {
        println!("[!] Opção inválida.");
        return Ok(());
    };
    let Some(candidate) = n.checked_sub(1).and_then(|i| candidates.get(i)) else {
        println!("[!] Opção inválida.");
        return Ok(());
    };

    match save_map(index, candidate) {
        Ok(path) => println!("[OK] Mapa salvo em: {}", path.display()),
        Err(e) => println!("[!] Não foi possível salvar o mapa: {}", e),
    }

    Ok(())
}

/// 지도 복원 및 PNG 저장
fn save_map(index: &MapIndex, candidate: &MapCandidate) -> Result<PathBuf> {
    let payload = index
        .get_payload(&candidate.image_record_id)
        .context("Falha ao carregar os dados do mapa")?;

    let img = reconstruct_image(&candidate.image_record_id, &payload)
        .context("Falha ao reconstruir a imagem")?;
    let display = upscale_for_display(&img);

    let stem = candidate
        .display_name
        .rsplit_once('.')
        .map(|(s, _)| s)
        .unwrap_or(&candidate.display_name);
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = PathBuf::from(format!(
        "mapa_{}_p{}_{}.png",
        stem, candidate.page_number, timestamp
    ));

    display
        .save(&path)
        .with_context(|| format!("Falha ao salvar: {:?}", path))?;

    Ok(path)
}

/// 문서 수집 (ingest docs)
async fn cmd_ingest_docs(dir: &PathBuf) -> Result<()> {
    let config = AppConfig::from_env();
    let retriever = build_retriever(&config).await?;

    println!("[*] Coletando documentos em: {}", dir.display());

    let stats = ingest::ingest_docs(&retriever, dir)
        .await
        .context("Falha na ingestão de documentos")?;

    println!();
    println!(
        "[OK] Concluído: {} arquivos, {} trechos indexados, {} falhas",
        stats.files_processed, stats.passages_indexed, stats.files_failed
    );

    Ok(())
}

/// 지도 수집 (ingest maps)
async fn cmd_ingest_maps(dir: &PathBuf) -> Result<()> {
    let config = AppConfig::from_env();
    let index = open_map_index(&config)?;

    println!("[*] Coletando mapas em: {}", dir.display());
    println!("[*] O índice anterior será substituído.");

    let stats = ingest::ingest_maps(&index, dir)
        .await
        .context("Falha na ingestão de mapas")?;

    println!();
    println!(
        "[OK] Concluído: {} mapas indexados, {} falhas",
        stats.images_indexed, stats.images_failed
    );

    Ok(())
}

/// 검색 명령어 (query)
async fn cmd_query(query: &str, limit: usize) -> Result<()> {
    let config = AppConfig::from_env();
    let retriever = build_retriever(&config).await?;

    println!("[*] Buscando: \"{}\"", query);

    let results = match retriever.retrieve_top_k(query, limit).await {
        Ok(r) => r,
        Err(e) => {
            println!("\n[!] {}", e);
            return Ok(());
        }
    };

    if results.is_empty() {
        println!("\n[!] Nenhum resultado encontrado.");
        return Ok(());
    }

    println!("\n[OK] Resultados ({}):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [similaridade: {:.4}] {} - Parte {}",
            i + 1,
            result.similarity,
            result.source_file,
            result.part_index
        );
        println!("   {}", truncate_text(&result.text, 200));
        println!();
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status() -> Result<()> {
    let config = AppConfig::from_env();
    let capabilities = config.capabilities();

    println!("tijuca-guia v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("[*] Diretório de dados: {}", config.data_dir.display());

    if capabilities.generation {
        println!("[OK] GROQ_API_KEY: configurada");
    } else {
        println!("[!] GROQ_API_KEY: ausente (respostas indisponíveis)");
    }

    if capabilities.weather {
        println!("[OK] WEATHER_API_KEY: configurada");
    } else {
        println!("[!] WEATHER_API_KEY: ausente (clima indisponível)");
    }

    println!(
        "[*] Embeddings: {} ({})",
        config.embeddings_base_url, config.embeddings_model
    );

    // 저장소 통계
    match build_retriever(&config).await {
        Ok(retriever) => match retriever.stats().await {
            Ok(stats) => {
                println!();
                println!("[*] Base de conhecimento:");
                println!("    Trechos: {}", stats.store.passage_count);
                println!("    Documentos: {}", stats.store.source_file_count);
                println!(
                    "    Texto total: {}",
                    format_bytes(stats.store.total_text_bytes)
                );
                println!("    Vetores: {}", stats.vector_count);
            }
            Err(e) => println!("[!] Falha ao ler estatísticas: {}", e),
        },
        Err(e) => println!("[!] {}", e),
    }

    match open_map_index(&config) {
        Ok(index) => {
            let count = index.count().unwrap_or(0);
            println!("[*] Mapas indexados: {}", count);
        }
        Err(e) => println!("[!] {}", e),
    }

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// 텍스트 절단 (문자 단위)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let text = text.replace('\n', " ");
    if text.chars().count() <= max_chars {
        text
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 수를 사람이 읽기 좋은 형식으로
fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("curto", 10), "curto");
        assert_eq!(truncate_text("0123456789ABC", 10), "0123456789...");
        assert_eq!(truncate_text("com\nquebra", 20), "com quebra");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
