fn main() -> anyhow::Result<()> {
    for id in snapgallery::run()? {
        println!("{id}");
    }
    Ok(())
}
