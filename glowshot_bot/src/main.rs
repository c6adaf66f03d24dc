use glowshot_bot::entry;

fn main() {
    glowshot_commons::start_everything(entry());
}
