use saude_bridge::api::app_router;
use saude_bridge::config::Config;
use saude_bridge::logging::init_tracing;
use saude_bridge::state::build_state;
use saude_bridge::tarefas::iniciar_recalculo_periodico;
use tracing::{info, warn};

async fn sinal_de_encerramento() {
    if let Err(erro) = tokio::signal::ctrl_c().await {
        warn!(error = %erro, "Falha ao aguardar sinal de encerramento");
        std::future::pending::<()>().await;
    }
    info!("Encerrando servidor");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.formato_log)?;

    let state = build_state(config.clone()).await?;
    let recalculo = iniciar_recalculo_periodico(state.clone());

    info!(
        addr = %config.listen_addr,
        versao = saude_bridge::built_info::PKG_VERSION,
        "Servidor ouvindo"
    );
    axum::Server::bind(&config.listen_addr)
        .serve(app_router(state).into_make_service())
        .with_graceful_shutdown(sinal_de_encerramento())
        .await?;

    recalculo.abort();
    Ok(())
}
