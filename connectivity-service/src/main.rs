fn main() -> anyhow::Result<()> {
    connectivity_service::run()
}
