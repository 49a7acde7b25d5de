fn main() -> anyhow::Result<()> {
    wrangler_lib::run()
}
