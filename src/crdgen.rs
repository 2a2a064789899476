use anyhow::Context;
use commonui_controller::operator::crd::CommonWebUI;
use kube::CustomResourceExt;
use std::{env, fs::File, io::Write};

fn main() -> anyhow::Result<()> {
    let current_dir = env::current_dir()?;

    let commonwebui_crd = serde_yaml::to_string(&CommonWebUI::crd())?;

    let path = current_dir.join("commonwebui_crd.yaml");
    let mut file = File::create(&path).with_context(|| format!("unable to create {}", path.display()))?;
    file.write_all(commonwebui_crd.as_bytes())?;

    Ok(())
}
