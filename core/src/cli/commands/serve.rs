use crate::cli::Workspace;

pub async fn run(workspace: Workspace, port: u16) -> Result<(), String> {
    crate::server::serve(workspace, port).await?;
    Ok(())
}
