fn main() -> anyhow::Result<()> {
    mobind::run()
}
